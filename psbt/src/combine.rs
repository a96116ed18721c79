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

use bc::secp256k1::PublicKey;
use bc::{LegacyPk, LegacySig, Txid};
use indexmap::IndexMap;

use crate::{Input, InputKey, KeyType, MapName, Output, OutputKey, Psbt, UnknownMap};

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum CombineError {
    /// PSBTs can't be combined since they contain different transactions ({ours} and {theirs}).
    MismatchedTransaction { ours: Txid, theirs: Txid },

    /// input #{input} contains two different signatures for the key {pubkey}.
    ConflictingSignature { input: usize, pubkey: PublicKey },

    /// {map} contains different values for the key of type {key}.
    ConflictingMetadata { map: MapName, key: u8 },
}

impl Psbt {
    /// Merges data from two PSBTs wrapping the same unsigned transaction.
    ///
    /// Fields present in one PSBT only are copied; fields present in both must be equal.
    /// Combining is commutative and idempotent.
    pub fn combine(&self, other: &Psbt) -> Result<Psbt, CombineError> {
        let (ours, theirs) = (self.to_unsigned_tx(), other.to_unsigned_tx());
        if ours != theirs {
            return Err(CombineError::MismatchedTransaction {
                ours: ours.txid(),
                theirs: theirs.txid(),
            });
        }

        let mut psbt = self.clone();
        merge_unknown(&mut psbt.unknown, &other.unknown, MapName::Global)?;
        for (input, theirs) in psbt.inputs.iter_mut().zip(&other.inputs) {
            input.combine(theirs)?;
        }
        for (output, theirs) in psbt.outputs.iter_mut().zip(&other.outputs) {
            output.combine(theirs)?;
        }

        debug!("combined PSBTs for transaction {}", ours.txid());
        Ok(psbt)
    }
}

impl Input {
    fn combine(&mut self, other: &Input) -> Result<(), CombineError> {
        let map = MapName::Input(self.index);

        // Signatures of a finalized input are frozen: they are taken from the finalized side
        // only, and the other side can't add to them.
        match (self.is_finalized(), other.is_finalized()) {
            (true, false) => {}
            (false, true) => self.partial_sigs = other.partial_sigs.clone(),
            _ => merge_sigs(&mut self.partial_sigs, &other.partial_sigs, self.index)?,
        }

        merge_field(
            &mut self.non_witness_tx,
            &other.non_witness_tx,
            map,
            InputKey::NonWitnessUtxo,
        )?;
        merge_field(&mut self.witness_utxo, &other.witness_utxo, map, InputKey::WitnessUtxo)?;
        merge_field(&mut self.sighash_type, &other.sighash_type, map, InputKey::SighashType)?;
        merge_field(&mut self.redeem_script, &other.redeem_script, map, InputKey::RedeemScript)?;
        merge_field(&mut self.witness_script, &other.witness_script, map, InputKey::WitnessScript)?;
        merge_field(
            &mut self.final_script_sig,
            &other.final_script_sig,
            map,
            InputKey::FinalScriptSig,
        )?;
        merge_field(&mut self.final_witness, &other.final_witness, map, InputKey::FinalWitness)?;
        merge_unknown(&mut self.unknown, &other.unknown, map)
    }
}

impl Output {
    fn combine(&mut self, other: &Output) -> Result<(), CombineError> {
        let map = MapName::Output(self.index);
        merge_field(&mut self.redeem_script, &other.redeem_script, map, OutputKey::RedeemScript)?;
        merge_field(
            &mut self.witness_script,
            &other.witness_script,
            map,
            OutputKey::WitnessScript,
        )?;
        merge_unknown(&mut self.unknown, &other.unknown, map)
    }
}

fn merge_field<T: Clone + Eq>(
    ours: &mut Option<T>,
    theirs: &Option<T>,
    map: MapName,
    key: impl KeyType,
) -> Result<(), CombineError> {
    match (ours.as_ref(), theirs) {
        (_, None) => {}
        (None, Some(value)) => *ours = Some(value.clone()),
        (Some(a), Some(b)) if a == b => {}
        (Some(_), Some(_)) => {
            return Err(CombineError::ConflictingMetadata {
                map,
                key: key.to_u8(),
            })
        }
    }
    Ok(())
}

fn merge_sigs(
    ours: &mut IndexMap<LegacyPk, LegacySig>,
    theirs: &IndexMap<LegacyPk, LegacySig>,
    input: usize,
) -> Result<(), CombineError> {
    for (pk, sig) in theirs {
        match ours.get(pk) {
            Some(existing) if existing != sig => {
                return Err(CombineError::ConflictingSignature {
                    input,
                    pubkey: pk.pubkey,
                })
            }
            Some(_) => {}
            None => {
                trace!("input #{input} receives signature by {}", pk.pubkey);
                ours.insert(*pk, sig.clone());
            }
        }
    }
    ours.sort_by(|pk1, _, pk2, _| pk1.to_vec().cmp(&pk2.to_vec()));
    Ok(())
}

fn merge_unknown(
    ours: &mut UnknownMap,
    theirs: &UnknownMap,
    map: MapName,
) -> Result<(), CombineError> {
    for (key_type, pairs) in theirs {
        let submap = ours.entry(*key_type).or_default();
        for (key_data, value) in pairs {
            match submap.get(key_data) {
                Some(existing) if existing != value => {
                    return Err(CombineError::ConflictingMetadata {
                        map,
                        key: *key_type,
                    })
                }
                Some(_) => {}
                None => {
                    submap.insert(key_data.clone(), value.clone());
                }
            }
        }
    }
    // keep serialization independent of the combination order
    ours.sort_keys();
    for submap in ours.values_mut() {
        submap.sort_keys();
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use amplify::{ByteArray, Wrapper};
    use bc::secp256k1::{Message, SecretKey, SECP256K1};
    use bc::{
        LockTime, Outpoint, ScriptBytes, ScriptPubkey, SeqNo, SighashType, TxOut, TxVer, Vout,
        Witness,
    };

    use super::*;
    use crate::{KeyData, Multisig, UnsignedTx, UnsignedTxIn, ValueData};

    fn sk(n: u8) -> SecretKey { SecretKey::from_byte_array(&[n; 32]).unwrap() }

    fn pk(n: u8) -> LegacyPk { LegacyPk::compressed(sk(n).public_key(SECP256K1)) }

    fn psbt(lock_time: u32) -> Psbt {
        let witness_script = Multisig::new(2, [pk(1), pk(2), pk(3)]).unwrap().to_witness_script();
        let mut psbt = Psbt::from_tx(UnsignedTx {
            version: TxVer::V2,
            inputs: vec![UnsignedTxIn {
                prev_output: Outpoint::new(Txid::from_byte_array([5; 32]), Vout::from_u32(0)),
                sequence: SeqNo::from_consensus_u32(u32::MAX),
            }],
            outputs: vec![TxOut::new(
                ScriptPubkey::from_inner(ScriptBytes::try_from(vec![0x51]).unwrap()),
                40_000u64,
            )],
            lock_time: LockTime::from_consensus_u32(lock_time),
        });
        let input = psbt.input_mut(0).unwrap();
        input.witness_utxo = Some(TxOut::new(witness_script.to_script_pubkey(), 50_000u64));
        input.witness_script = Some(witness_script);
        psbt
    }

    fn unknown(key_type: u8, key: u8, value: u8) -> UnknownMap {
        let mut submap = IndexMap::new();
        submap.insert(KeyData::from(vec![key]), ValueData::from(vec![value]));
        let mut map = UnknownMap::new();
        map.insert(key_type, submap);
        map
    }

    #[test]
    fn mismatched_transaction() {
        let a = psbt(0);
        let b = psbt(1);
        assert_eq!(
            a.combine(&b),
            Err(CombineError::MismatchedTransaction {
                ours: a.txid(),
                theirs: b.txid()
            })
        );
    }

    #[test]
    fn union_of_signatures() {
        let base = psbt(0);
        let a = base.sign_input(0, &sk(1)).unwrap();
        let b = base.sign_input(0, &sk(2)).unwrap();

        let ab = a.combine(&b).unwrap();
        assert_eq!(ab.input(0).unwrap().partial_sigs.len(), 2);
        assert_eq!(ab, b.combine(&a).unwrap());
        assert_eq!(ab.combine(&b).unwrap(), ab);
        assert_eq!(ab.combine(&base).unwrap(), ab);
        assert!(ab.is_complete());
    }

    #[test]
    fn conflicting_signature() {
        let a = psbt(0).sign_input(0, &sk(1)).unwrap();
        let mut b = psbt(0);
        let bogus = LegacySig {
            sig: SECP256K1.sign_ecdsa(&Message::from_digest([1; 32]), &sk(1)),
            sighash_type: SighashType::all(),
        };
        b.input_mut(0).unwrap().partial_sigs.insert(pk(1), bogus);
        assert_eq!(
            a.combine(&b),
            Err(CombineError::ConflictingSignature {
                input: 0,
                pubkey: pk(1).pubkey
            })
        );
    }

    #[test]
    fn combination_is_associative() {
        let base = psbt(0);
        let a = base.sign_input(0, &sk(1)).unwrap();
        let b = base.sign_input(0, &sk(3)).unwrap();
        let mut c = base.sign_input(0, &sk(2)).unwrap();
        c.unknown = unknown(0x70, 1, 1);
        c.input_mut(0).unwrap().sighash_type = Some(SighashType::all());

        let left = a.combine(&b).unwrap().combine(&c).unwrap();
        let right = a.combine(&b.combine(&c).unwrap()).unwrap();
        assert_eq!(left, right);
        assert_eq!(left.serialize(), right.serialize());
        assert_eq!(left.serialize(), c.combine(&b).unwrap().combine(&a).unwrap().serialize());
        assert_eq!(left.input(0).unwrap().partial_sigs.len(), 3);
    }

    #[test]
    fn combined_prevouts_are_checked() {
        let base = psbt(0);
        let witness_utxo = base.input(0).unwrap().witness_utxo.clone().unwrap();
        let prev_tx = bc::Tx {
            version: TxVer::V2,
            inputs: bc::VarIntArray::from_iter_checked([]),
            outputs: bc::VarIntArray::from_iter_checked([TxOut::new(
                witness_utxo.script_pubkey.clone(),
                5_000_000u64,
            )]),
            lock_time: LockTime::ZERO,
        };
        let mut honest = base.clone();
        let input = honest.input_mut(0).unwrap();
        input.previous_outpoint = Outpoint::new(prev_tx.txid(), Vout::from_u32(0));
        input.witness_utxo = None;
        input.non_witness_tx = Some(prev_tx);
        let mut forged = honest.clone();
        let input = forged.input_mut(0).unwrap();
        input.non_witness_tx = None;
        input.witness_utxo = Some(witness_utxo);

        let combined = honest.combine(&forged).unwrap();
        assert_eq!(combined.input(0).unwrap().prev_txout(), None);
        assert_eq!(combined.fee(), None);
        assert_eq!(combined.input_status(0), Err(crate::InputError::PrevoutMismatch(0)));
    }

    #[test]
    fn metadata() {
        let mut a = psbt(0);
        let mut b = psbt(0);
        a.input_mut(0).unwrap().witness_script = None;
        b.input_mut(0).unwrap().sighash_type = Some(SighashType::all());
        let ab = a.combine(&b).unwrap();
        assert!(ab.input(0).unwrap().witness_script.is_some());
        assert_eq!(ab.input(0).unwrap().sighash_type, Some(SighashType::all()));

        a.input_mut(0).unwrap().sighash_type = Some(SighashType::none());
        assert_eq!(
            a.combine(&b),
            Err(CombineError::ConflictingMetadata {
                map: MapName::Input(0),
                key: 0x03
            })
        );
    }

    #[test]
    fn unknown_keys() {
        let mut a = psbt(0);
        let mut b = psbt(0);
        a.unknown = unknown(0x70, 1, 1);
        b.unknown = unknown(0x01, 1, 1);
        b.output_mut(0).unwrap().unknown = unknown(0x02, 2, 2);

        let ab = a.combine(&b).unwrap();
        let ba = b.combine(&a).unwrap();
        assert_eq!(ab.unknown.len(), 2);
        assert_eq!(ab.serialize(), ba.serialize());
        assert_eq!(ab.output(0).unwrap().unknown, unknown(0x02, 2, 2));

        a.unknown = unknown(0x01, 1, 2);
        assert_eq!(
            a.combine(&b),
            Err(CombineError::ConflictingMetadata {
                map: MapName::Global,
                key: 0x01
            })
        );
    }

    #[test]
    fn finalized_input_keeps_its_signatures() {
        let base = psbt(0);
        let mut finalized = base.sign_input(0, &sk(1)).unwrap();
        finalized.input_mut(0).unwrap().final_witness = Some(Witness::new());
        let other = base.sign_input(0, &sk(2)).unwrap();

        let combined = finalized.combine(&other).unwrap();
        assert_eq!(combined, other.combine(&finalized).unwrap());
        let input = combined.input(0).unwrap();
        assert!(input.is_finalized());
        assert_eq!(input.partial_sigs.keys().collect::<Vec<_>>(), vec![&pk(1)]);
    }
}
