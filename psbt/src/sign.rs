// Offline multi-party signing of bitcoin transactions with PSBTs.
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2024 by
//     Coldsig Developers
//
// Copyright (C) 2024 Coldsig Developers. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bc::secp256k1::{ecdsa, SecretKey, SECP256K1};
use bc::{
    LegacyPk, LegacySig, Sats, ScriptCode, ScriptPubkey, Sighash, SighashCache, SighashError,
    SighashFlag, Tx, TxOut, Txid,
};

use crate::{InputError, Psbt, ScriptTemplate};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("the transaction was rejected by the signer.")]
pub struct Rejected;

#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum SignError {
    /// the transaction was rejected by the signer.
    #[from(Rejected)]
    Rejected,

    /// input #{0} is already finalized and its signatures can't be changed.
    Finalized(usize),

    /// none of the signer keys participate in the script spent by input #{0}.
    ForeignKey(usize),

    #[from]
    #[display(inner)]
    Input(InputError),

    /// transaction {txid} input {index} uses SIGHASH_SINGLE, but the total
    /// number of outputs is {outputs} and thus no signature can be produced.
    SighashSingleMismatch {
        txid: Txid,
        index: usize,
        outputs: usize,
    },

    #[from]
    #[display(inner)]
    Sighash(SighashError),
}

/// Trait for types holding private keys and producing signatures with them.
///
/// Implementations must never expose the key material itself: only public keys and signatures
/// leave the signer.
pub trait Sign {
    /// Public keys for which the signer can produce signatures, in all the serialization forms
    /// it is able to recognize in scripts.
    fn public_keys(&self) -> Vec<LegacyPk>;

    /// Signs `message` with the private key corresponding to `pk`. Returns `None` if the key is
    /// not known to the signer.
    fn sign_ecdsa(&self, message: Sighash, pk: LegacyPk) -> Option<ecdsa::Signature>;
}

impl Sign for SecretKey {
    fn public_keys(&self) -> Vec<LegacyPk> {
        let pubkey = self.public_key(SECP256K1);
        vec![LegacyPk::compressed(pubkey), LegacyPk {
            compressed: false,
            pubkey,
        }]
    }

    fn sign_ecdsa(&self, message: Sighash, pk: LegacyPk) -> Option<ecdsa::Signature> {
        if self.public_key(SECP256K1) != pk.pubkey {
            return None;
        }
        Some(SecretKey::sign_ecdsa(self, message.into()))
    }
}

impl<'a, T: Sign + ?Sized> Sign for &'a T {
    fn public_keys(&self) -> Vec<LegacyPk> { (*self).public_keys() }

    fn sign_ecdsa(&self, message: Sighash, pk: LegacyPk) -> Option<ecdsa::Signature> {
        (*self).sign_ecdsa(message, pk)
    }
}

impl<T: Sign> Sign for [T] {
    fn public_keys(&self) -> Vec<LegacyPk> { self.iter().flat_map(T::public_keys).collect() }

    fn sign_ecdsa(&self, message: Sighash, pk: LegacyPk) -> Option<ecdsa::Signature> {
        self.iter().find_map(|signer| signer.sign_ecdsa(message, pk))
    }
}

/// Trait which should be implemented by all signers.
///
/// Signers must ensure that the transaction is checked by the user when they get
/// [`Signer::approve`] callback.
pub trait Signer {
    /// Type which does the actual signatures. See [`Sign`] trait for the details.
    type Sign<'s>: Sign
    where Self: 's;

    /// In the implementation of this method signers must ensure that transaction is checked by the
    /// user.
    fn approve(&self, psbt: &Psbt) -> Result<Self::Sign<'_>, Rejected>;
}

impl Psbt {
    /// Signature hasher over the unsigned transaction. Inputs without previous output data get
    /// an empty placeholder, since legacy and segwit v0 hashes commit only to the spent output
    /// of the input being signed.
    pub(crate) fn sighash_cache(&self) -> SighashCache<TxOut> {
        let prevouts = self
            .inputs()
            .map(|input| {
                input
                    .prev_txout()
                    .cloned()
                    .unwrap_or_else(|| TxOut::new(ScriptPubkey::new(), Sats::ZERO))
            })
            .collect::<Vec<_>>();
        SighashCache::new(Tx::from(self.to_unsigned_tx()), prevouts)
            .expect("one prevout per input")
    }

    /// Hash signed by the signatures of input `index` spending `template`.
    pub(crate) fn sighash(
        &self,
        index: usize,
        template: &ScriptTemplate,
        sig_hasher: &mut SighashCache<TxOut>,
    ) -> Result<Sighash, SignError> {
        let input = self.checked_input(index)?;
        let sighash_type = input.sighash_type();
        if sighash_type.flag == SighashFlag::Single && index >= self.outputs.len() {
            return Err(SignError::SighashSingleMismatch {
                txid: self.txid(),
                index,
                outputs: self.outputs.len(),
            });
        }
        let prevout = input.checked_prevout()?;
        let sighash = match template {
            ScriptTemplate::P2pkh { .. } => {
                sig_hasher.legacy_sighash(index, &prevout.script_pubkey, sighash_type.to_consensus_u32())?
            }
            ScriptTemplate::P2wshMulti { witness_script, .. } => sig_hasher.segwit_sighash(
                index,
                &ScriptCode::with_p2wsh(witness_script),
                prevout.value,
                sighash_type,
            )?,
        };
        Ok(sighash)
    }

    /// Signs a single input with the keys of `signer` which participate in the spent script.
    /// Signatures made with the same keys before are replaced.
    ///
    /// Returns a new PSBT, leaving the original intact.
    pub fn sign_input(
        &self,
        index: usize,
        signer: &(impl Sign + ?Sized),
    ) -> Result<Psbt, SignError> {
        let input = self.checked_input(index)?;
        if input.is_finalized() {
            return Err(SignError::Finalized(index));
        }
        let template = input.template()?;
        let mut psbt = self.clone();
        let mut sig_hasher = self.sighash_cache();
        if self.sign_input_with(&mut psbt, index, &template, signer, &mut sig_hasher)? == 0 {
            return Err(SignError::ForeignKey(index));
        }
        Ok(psbt)
    }

    /// Signs PSBT using the given `signer`. The signer determines whether the
    /// transaction should be accepted by the user; after that each input whose script involves
    /// signer keys gets signed.
    ///
    /// Finalized inputs and inputs spending unsupported scripts are skipped. Returns the signed
    /// PSBT and the number of produced signatures.
    pub fn sign(&self, signer: &impl Signer) -> Result<(Psbt, usize), SignError> {
        let satisfier = signer.approve(self)?;

        let mut psbt = self.clone();
        let mut sig_hasher = self.sighash_cache();
        let mut sig_count = 0usize;

        for input in self.inputs() {
            if input.is_finalized() {
                debug!("skipping finalized input #{}", input.index);
                continue;
            }
            let template = match input.template() {
                Ok(template) => template,
                Err(err @ InputError::UnsupportedScript(_)) => {
                    warn!("skipping {err}");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let index = input.index;
            sig_count +=
                self.sign_input_with(&mut psbt, index, &template, &satisfier, &mut sig_hasher)?;
        }

        debug!("produced {sig_count} signature(s) for transaction {}", psbt.txid());
        Ok((psbt, sig_count))
    }

    /// Adds signatures of `signer` keys participating in `template` to the input of `target`,
    /// which must be a copy of this PSBT.
    fn sign_input_with(
        &self,
        target: &mut Psbt,
        index: usize,
        template: &ScriptTemplate,
        signer: &(impl Sign + ?Sized),
        sig_hasher: &mut SighashCache<TxOut>,
    ) -> Result<usize, SignError> {
        let keys = signer
            .public_keys()
            .into_iter()
            .filter(|pk| template.has_key(pk))
            .collect::<Vec<_>>();
        if keys.is_empty() {
            return Ok(0);
        }

        let sighash = self.sighash(index, template, sig_hasher)?;
        let input = target.inputs.get_mut(index).ok_or(InputError::IndexOutOfRange {
            index,
            inputs: self.inputs.len(),
        })?;
        let sighash_type = input.sighash_type();

        let mut signature_count = 0usize;
        for pk in keys {
            let Some(sig) = signer.sign_ecdsa(sighash, pk) else {
                continue;
            };
            debug!("signed input #{index} with key {} ({sighash_type:?})", pk.pubkey);
            input.partial_sigs.insert(pk, LegacySig { sig, sighash_type });
            signature_count += 1;
        }
        Ok(signature_count)
    }
}
