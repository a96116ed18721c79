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

use bc::{LegacyPk, PubkeyHash, ScriptPubkey, TxOut, WitnessScript};
use bitcoin_hashes::{hash160, Hash};

use crate::{Input, Multisig, MultisigError, Psbt};

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum InputError {
    /// input index {index} is out of range for PSBT with {inputs} inputs.
    IndexOutOfRange { index: usize, inputs: usize },

    /// input #{0} doesn't provide the spent output: neither witness UTXO nor non-witness
    /// transaction is known.
    NoPrevout(usize),

    /// witness UTXO of input #{0} contradicts the output of the non-witness transaction it
    /// spends, or the non-witness transaction doesn't match the spent outpoint.
    PrevoutMismatch(usize),

    /// input #{0} spends an unsupported script; only P2PKH and P2WSH multisig outputs can be
    /// signed.
    UnsupportedScript(usize),

    /// P2WSH input #{0} doesn't provide witness script.
    NoWitnessScript(usize),

    /// witness script of input #{0} doesn't match the script hash of the spent output.
    WitnessScriptMismatch(usize),

    /// witness script of input #{0} is not a supported multisig: {1}
    InvalidMultisig(usize, MultisigError),
}

/// Script spent by an input, in one of the forms which can be signed and finalized.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ScriptTemplate {
    /// Pay-to-public-key-hash, satisfied by a single signature and the public key.
    P2pkh { pubkey_hash: PubkeyHash },

    /// Pay-to-witness-script-hash over a bare `CHECKMULTISIG` witness script.
    P2wshMulti {
        witness_script: WitnessScript,
        multisig: Multisig,
    },
}

impl ScriptTemplate {
    /// Number of valid signatures required to satisfy the script.
    pub fn required_sigs(&self) -> usize {
        match self {
            ScriptTemplate::P2pkh { .. } => 1,
            ScriptTemplate::P2wshMulti { multisig, .. } => multisig.threshold(),
        }
    }

    pub fn is_segwit(&self) -> bool { matches!(self, ScriptTemplate::P2wshMulti { .. }) }

    /// Whether a signature by `pk` may contribute to satisfying the script.
    pub fn has_key(&self, pk: &LegacyPk) -> bool {
        match self {
            ScriptTemplate::P2pkh { pubkey_hash } => pubkey_hash_of(pk) == *pubkey_hash,
            ScriptTemplate::P2wshMulti { multisig, .. } => multisig.key_position(pk).is_some(),
        }
    }
}

/// HASH160 of the public key serialized the way it is pushed into a scriptSig.
pub fn pubkey_hash_of(pk: &LegacyPk) -> PubkeyHash {
    let hash = if pk.compressed {
        hash160::Hash::hash(&pk.pubkey.serialize())
    } else {
        hash160::Hash::hash(&pk.pubkey.serialize_uncompressed())
    };
    PubkeyHash::from(hash.to_byte_array())
}

fn p2pkh_hash(script_pubkey: &ScriptPubkey) -> Option<PubkeyHash> {
    let [0x76, 0xA9, 0x14, hash @ .., 0x88, 0xAC] = script_pubkey.as_slice() else {
        return None;
    };
    <[u8; 20]>::try_from(hash).ok().map(PubkeyHash::from)
}

fn is_p2wsh(script_pubkey: &ScriptPubkey) -> bool {
    matches!(script_pubkey.as_slice(), [0x00, 0x20, hash @ ..] if hash.len() == 32)
}

impl Psbt {
    pub(crate) fn checked_input(&self, index: usize) -> Result<&Input, InputError> {
        self.input(index).ok_or(InputError::IndexOutOfRange {
            index,
            inputs: self.inputs.len(),
        })
    }
}

impl Input {
    /// Determines what the input spends from the previous output and the witness script.
    pub fn template(&self) -> Result<ScriptTemplate, InputError> {
        let prevout = self.checked_prevout()?;
        if let Some(pubkey_hash) = p2pkh_hash(&prevout.script_pubkey) {
            return Ok(ScriptTemplate::P2pkh { pubkey_hash });
        }
        if !is_p2wsh(&prevout.script_pubkey) {
            return Err(InputError::UnsupportedScript(self.index));
        }
        let witness_script =
            self.witness_script.clone().ok_or(InputError::NoWitnessScript(self.index))?;
        if witness_script.to_script_pubkey() != prevout.script_pubkey {
            return Err(InputError::WitnessScriptMismatch(self.index));
        }
        let multisig = Multisig::from_script(&witness_script)
            .map_err(|err| InputError::InvalidMultisig(self.index, err))?;
        Ok(ScriptTemplate::P2wshMulti {
            witness_script,
            multisig,
        })
    }

    /// Output spent by this input.
    ///
    /// When both the witness UTXO and the non-witness transaction are present they must agree,
    /// and the non-witness transaction must be the one referenced by the spent outpoint.
    /// Otherwise the amount the signature commits to can't be trusted.
    pub fn checked_prevout(&self) -> Result<&TxOut, InputError> {
        let from_tx = match &self.non_witness_tx {
            Some(tx) if tx.txid() != self.previous_outpoint.txid => {
                return Err(InputError::PrevoutMismatch(self.index));
            }
            Some(tx) => Some(
                tx.outputs
                    .get(self.previous_outpoint.vout.to_usize())
                    .ok_or(InputError::PrevoutMismatch(self.index))?,
            ),
            None => None,
        };
        match (&self.witness_utxo, from_tx) {
            (Some(utxo), Some(txout)) if utxo != txout => {
                Err(InputError::PrevoutMismatch(self.index))
            }
            (Some(txout), _) | (None, Some(txout)) => Ok(txout),
            (None, None) => Err(InputError::NoPrevout(self.index)),
        }
    }
}

#[cfg(test)]
mod test {
    use amplify::{ByteArray, Wrapper};
    use bc::secp256k1::{SecretKey, SECP256K1};
    use bc::{
        LockTime, Outpoint, Sats, ScriptBytes, SeqNo, SigScript, Tx, TxIn, TxVer, Txid,
        VarIntArray, Vout, Witness,
    };

    use super::*;

    fn pk(n: u8) -> LegacyPk {
        LegacyPk::compressed(SecretKey::from_byte_array(&[n; 32]).unwrap().public_key(SECP256K1))
    }

    fn spk(bytes: Vec<u8>) -> ScriptPubkey {
        ScriptPubkey::from_inner(ScriptBytes::try_from(bytes).unwrap())
    }

    fn outpoint(txid: Txid, vout: u32) -> Outpoint { Outpoint::new(txid, Vout::from_u32(vout)) }

    fn input(spk: ScriptPubkey) -> Input {
        let mut input = Input::new(3, outpoint(Txid::from_byte_array([1; 32]), 0));
        input.witness_utxo = Some(TxOut::new(spk, 10_000u64));
        input
    }

    fn prev_tx(value: u64) -> Tx {
        Tx {
            version: TxVer::V2,
            inputs: VarIntArray::from_iter_checked([TxIn {
                prev_output: outpoint(Txid::from_byte_array([7; 32]), 0),
                sig_script: SigScript::new(),
                sequence: SeqNo::from_consensus_u32(0xFFFF_FFFF),
                witness: Witness::new(),
            }]),
            outputs: VarIntArray::from_iter_checked([
                TxOut::new(spk(vec![0x51]), 1_000u64),
                TxOut::new(ScriptPubkey::p2pkh(pubkey_hash_of(&pk(1))), value),
            ]),
            lock_time: LockTime::ZERO,
        }
    }

    #[test]
    fn p2pkh() {
        let hash = pubkey_hash_of(&pk(1));
        let input = input(ScriptPubkey::p2pkh(hash));
        let template = input.template().unwrap();
        assert_eq!(template, ScriptTemplate::P2pkh { pubkey_hash: hash });
        assert_eq!(template.required_sigs(), 1);
        assert!(!template.is_segwit());
        assert!(template.has_key(&pk(1)));
        assert!(!template.has_key(&pk(2)));
        let uncompressed = LegacyPk {
            compressed: false,
            pubkey: pk(1).pubkey,
        };
        assert!(!template.has_key(&uncompressed));
    }

    #[test]
    fn p2wsh_multisig() {
        let multisig = Multisig::new(2, [pk(1), pk(2), pk(3)]).unwrap();
        let witness_script = multisig.to_witness_script();
        let mut input = input(witness_script.to_script_pubkey());
        assert_eq!(input.template(), Err(InputError::NoWitnessScript(3)));

        input.witness_script = Some(Multisig::new(1, [pk(1)]).unwrap().to_witness_script());
        assert_eq!(input.template(), Err(InputError::WitnessScriptMismatch(3)));

        input.witness_script = Some(witness_script.clone());
        let template = input.template().unwrap();
        assert_eq!(template.required_sigs(), 2);
        assert!(template.is_segwit());
        assert!(template.has_key(&pk(3)));
        assert!(!template.has_key(&pk(4)));
    }

    #[test]
    fn non_multisig_witness_script() {
        let witness_script =
            WitnessScript::from_inner(ScriptBytes::try_from(vec![0x51]).unwrap());
        let mut input = input(witness_script.to_script_pubkey());
        input.witness_script = Some(witness_script);
        assert_eq!(
            input.template(),
            Err(InputError::InvalidMultisig(3, MultisigError::NotMultisig))
        );
    }

    #[test]
    fn unsupported() {
        let mut input = input(spk(vec![0x00, 0x14]));
        assert_eq!(input.template(), Err(InputError::UnsupportedScript(3)));
        input.witness_utxo = None;
        assert_eq!(input.template(), Err(InputError::NoPrevout(3)));
    }

    #[test]
    fn witness_utxo_contradicting_non_witness_tx() {
        let tx = prev_tx(1_000_000);
        let mut input = Input::new(0, outpoint(tx.txid(), 1));
        input.non_witness_tx = Some(tx.clone());
        assert_eq!(input.checked_prevout(), Ok(&tx.outputs[1]));
        assert_eq!(input.value(), Some(Sats::from(1_000_000u64)));

        input.witness_utxo = Some(tx.outputs[1].clone());
        assert_eq!(input.checked_prevout(), Ok(&tx.outputs[1]));

        input.witness_utxo =
            Some(TxOut::new(ScriptPubkey::p2pkh(pubkey_hash_of(&pk(1))), 100_000u64));
        assert_eq!(input.checked_prevout(), Err(InputError::PrevoutMismatch(0)));
        assert_eq!(input.template(), Err(InputError::PrevoutMismatch(0)));
        assert_eq!(input.value(), None);
    }

    #[test]
    fn non_witness_tx_for_other_outpoint() {
        let tx = prev_tx(50_000);
        let mut input = Input::new(0, outpoint(Txid::from_byte_array([2; 32]), 1));
        input.non_witness_tx = Some(tx.clone());
        assert_eq!(input.checked_prevout(), Err(InputError::PrevoutMismatch(0)));

        input.previous_outpoint = outpoint(tx.txid(), 2);
        assert_eq!(input.checked_prevout(), Err(InputError::PrevoutMismatch(0)));
    }
}
