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

use std::fmt::{self, Debug, Formatter};

use bc::secp256k1::{ecdsa, SecretKey};
use bc::{LegacyPk, Sats, Sighash};
use psbt::{Psbt, Rejected, Sign, Signer};

/// Conditions under which [`KeySigner`] agrees to sign a transaction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct SignerPolicy {
    /// Maximal fee the transaction may pay. If not set, any fee is accepted as long as it can be
    /// computed from the PSBT.
    pub max_fee: Option<Sats>,
}

impl SignerPolicy {
    pub fn with_max_fee(max_fee: impl Into<Sats>) -> Self {
        Self {
            max_fee: Some(max_fee.into()),
        }
    }
}

/// Signer holding private keys in memory.
///
/// The keys never leave the signer: they are not serializable and the [`Debug`] output shows
/// only their number.
#[derive(Clone)]
pub struct KeySigner {
    keys: Vec<SecretKey>,
    policy: SignerPolicy,
}

impl Debug for KeySigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySigner")
            .field("keys", &format_args!("<{} redacted>", self.keys.len()))
            .field("policy", &self.policy)
            .finish()
    }
}

impl KeySigner {
    pub fn new(keys: impl IntoIterator<Item = SecretKey>, policy: SignerPolicy) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            policy,
        }
    }

    pub fn with_key(key: SecretKey) -> Self { Self::new([key], none!()) }

    pub fn policy(&self) -> SignerPolicy { self.policy }

    pub fn set_policy(&mut self, policy: SignerPolicy) { self.policy = policy }
}

impl Signer for KeySigner {
    type Sign<'s> = &'s [SecretKey] where Self: 's;

    fn approve(&self, psbt: &Psbt) -> Result<Self::Sign<'_>, Rejected> {
        let txid = psbt.txid();
        let Some(fee) = psbt.fee() else {
            warn!("refusing to sign {txid}: the fee can't be computed from the PSBT");
            return Err(Rejected);
        };
        match self.policy.max_fee {
            Some(max_fee) if fee > max_fee => {
                warn!("refusing to sign {txid}: fee of {fee} sats exceeds the limit of {max_fee}");
                Err(Rejected)
            }
            _ => {
                debug!("approved signing of {txid} paying {fee} sats of fee");
                Ok(&self.keys)
            }
        }
    }
}

impl Sign for KeySigner {
    fn public_keys(&self) -> Vec<LegacyPk> { self.keys.as_slice().public_keys() }

    fn sign_ecdsa(&self, message: Sighash, pk: LegacyPk) -> Option<ecdsa::Signature> {
        self.keys.as_slice().sign_ecdsa(message, pk)
    }
}

#[cfg(test)]
mod test {
    use amplify::Wrapper;
    use bc::secp256k1::SECP256K1;
    use bc::{
        LockTime, Outpoint, ScriptBytes, ScriptPubkey, SeqNo, Tx, TxOut, TxVer, VarIntArray, Vout,
    };
    use psbt::{pubkey_hash_of, UnsignedTx, UnsignedTxIn};

    use super::*;

    fn key() -> SecretKey { SecretKey::from_byte_array(&[0x42; 32]).unwrap() }

    /// PSBT spending 1_000_000 sats to a 995_000 sats output.
    fn psbt() -> Psbt {
        let spk = ScriptPubkey::p2pkh(pubkey_hash_of(&LegacyPk::compressed(
            key().public_key(SECP256K1),
        )));
        let prev_tx = Tx {
            version: TxVer::V2,
            inputs: VarIntArray::from_iter_checked([]),
            outputs: VarIntArray::from_iter_checked([TxOut::new(spk, 1_000_000u64)]),
            lock_time: LockTime::ZERO,
        };
        let mut psbt = Psbt::from_tx(UnsignedTx {
            version: TxVer::V2,
            inputs: vec![UnsignedTxIn {
                prev_output: Outpoint::new(prev_tx.txid(), Vout::from_u32(0)),
                sequence: SeqNo::from_consensus_u32(u32::MAX),
            }],
            outputs: vec![TxOut::new(
                ScriptPubkey::from_inner(ScriptBytes::try_from(vec![0x51]).unwrap()),
                995_000u64,
            )],
            lock_time: LockTime::ZERO,
        });
        psbt.input_mut(0).unwrap().non_witness_tx = Some(prev_tx);
        psbt
    }

    #[test]
    fn fee_policy() {
        let psbt = psbt();
        let signer = KeySigner::new([key()], SignerPolicy::with_max_fee(5_000u64));
        let (signed, count) = psbt.sign(&signer).unwrap();
        assert_eq!(count, 1);
        assert!(signed.is_complete());

        let strict = KeySigner::new([key()], SignerPolicy::with_max_fee(4_999u64));
        assert!(strict.approve(&psbt).is_err());
    }

    #[test]
    fn understated_input_value_is_rejected() {
        let mut psbt = psbt();
        let prevout = psbt.input(0).unwrap().non_witness_tx.as_ref().unwrap().outputs[0].clone();
        // with this value the fee would look like 4_000 sats instead of 5_000
        psbt.input_mut(0).unwrap().witness_utxo =
            Some(TxOut::new(prevout.script_pubkey, 999_000u64));
        let signer = KeySigner::new([key()], SignerPolicy::with_max_fee(4_500u64));
        assert_eq!(psbt.fee(), None);
        assert!(matches!(signer.approve(&psbt), Err(Rejected)));
        assert!(psbt.sign(&signer).is_err());
    }

    #[test]
    fn debug_hides_keys() {
        let signer = KeySigner::new([key()], SignerPolicy::with_max_fee(1000u64));
        let debug = format!("{signer:?}");
        assert!(debug.contains("<1 redacted>"));
        assert!(!debug.contains("4242"));
    }
}
