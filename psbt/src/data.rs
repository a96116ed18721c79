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

use bc::{
    LegacyPk, LegacySig, LockTime, Outpoint, RedeemScript, Sats, ScriptPubkey, SeqNo, SigScript,
    SighashType, Tx, TxIn, TxOut, TxVer, Txid, VarIntArray, Witness, WitnessScript,
};
use indexmap::IndexMap;

pub use self::display_from_str::PsbtParseError;
use crate::maps::UnknownMap;

/// Structure representing data on unsigned transaction the way it is stored in the PSBT global
/// key.
///
/// We can't use [`Tx`] since PSBT may contain unsigned transaction with zero inputs, according to
/// BIP-174 test cases. [`Tx`] containing zero inputs is an invalid structure, prohibited by
/// consensus. An attempt to deserialize it will be incorrectly identified as a Segwit transaction
/// (since zero inputs is the trick which was used to make Segwit softfork) and fail with invalid
/// segwit flag error.
///
/// `UnsignedTx` also ensures invariant that none of its inputs contain witnesses or sigscripts.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct UnsignedTx {
    pub version: TxVer,
    pub inputs: Vec<UnsignedTxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: LockTime,
}

impl From<Tx> for UnsignedTx {
    #[inline]
    fn from(tx: Tx) -> UnsignedTx { UnsignedTx::with_sigs_removed(tx) }
}

impl From<UnsignedTx> for Tx {
    #[inline]
    fn from(unsigned_tx: UnsignedTx) -> Tx {
        Tx {
            version: unsigned_tx.version,
            inputs: VarIntArray::from_collection_unsafe(
                unsigned_tx.inputs.into_iter().map(TxIn::from).collect(),
            ),
            outputs: VarIntArray::from_collection_unsafe(unsigned_tx.outputs),
            lock_time: unsigned_tx.lock_time,
        }
    }
}

impl UnsignedTx {
    #[inline]
    pub fn with_sigs_removed(tx: Tx) -> UnsignedTx {
        UnsignedTx {
            version: tx.version,
            inputs: tx.inputs.into_iter().map(UnsignedTxIn::with_sigs_removed).collect(),
            outputs: tx.outputs.into_iter().collect(),
            lock_time: tx.lock_time,
        }
    }

    pub fn txid(&self) -> Txid { self.clone().finalize().txid() }

    pub fn finalize(self) -> Tx { Tx::from(self) }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct UnsignedTxIn {
    pub prev_output: Outpoint,
    pub sequence: SeqNo,
}

impl From<TxIn> for UnsignedTxIn {
    #[inline]
    fn from(txin: TxIn) -> UnsignedTxIn { UnsignedTxIn::with_sigs_removed(txin) }
}

impl From<UnsignedTxIn> for TxIn {
    #[inline]
    fn from(unsigned_txin: UnsignedTxIn) -> TxIn {
        TxIn {
            prev_output: unsigned_txin.prev_output,
            sig_script: SigScript::new(),
            sequence: unsigned_txin.sequence,
            witness: Witness::new(),
        }
    }
}

impl UnsignedTxIn {
    #[inline]
    pub fn with_sigs_removed(txin: TxIn) -> UnsignedTxIn {
        UnsignedTxIn {
            prev_output: txin.prev_output,
            sequence: txin.sequence,
        }
    }
}

/// Partially signed transaction (BIP-174, version 0).
///
/// All the operations transforming PSBT (signing, combining, finalizing) take `&self` and return
/// a new PSBT, so independent signers may work on their own copies.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Psbt {
    /// Transaction version.
    pub tx_version: TxVer,

    /// Transaction lock time.
    pub lock_time: LockTime,

    /// The corresponding key-value map for each input.
    pub(crate) inputs: Vec<Input>,

    /// The corresponding key-value map for each output.
    pub(crate) outputs: Vec<Output>,

    /// Unknown keys, including BIP-32 xpubs and proprietary keys.
    pub unknown: UnknownMap,
}

impl Psbt {
    /// Wraps unsigned transaction into a PSBT with empty input and output maps.
    pub fn from_tx(tx: impl Into<UnsignedTx>) -> Self { Psbt::from_unsigned_tx(tx.into()) }

    pub(crate) fn from_unsigned_tx(unsigned_tx: UnsignedTx) -> Self {
        Psbt {
            tx_version: unsigned_tx.version,
            lock_time: unsigned_tx.lock_time,
            inputs: unsigned_tx
                .inputs
                .into_iter()
                .enumerate()
                .map(Input::from_unsigned_txin)
                .collect(),
            outputs: unsigned_tx.outputs.into_iter().enumerate().map(Output::from_txout).collect(),
            unknown: none!(),
        }
    }

    pub fn to_unsigned_tx(&self) -> UnsignedTx {
        UnsignedTx {
            version: self.tx_version,
            inputs: self.inputs().map(Input::to_unsigned_txin).collect(),
            outputs: self.outputs().map(Output::to_txout).collect(),
            lock_time: self.lock_time,
        }
    }

    pub fn txid(&self) -> Txid { self.to_unsigned_tx().txid() }

    pub fn input(&self, index: usize) -> Option<&Input> { self.inputs.get(index) }

    pub fn input_mut(&mut self, index: usize) -> Option<&mut Input> { self.inputs.get_mut(index) }

    pub fn inputs(&self) -> impl Iterator<Item = &Input> { self.inputs.iter() }

    pub fn inputs_mut(&mut self) -> impl Iterator<Item = &mut Input> { self.inputs.iter_mut() }

    pub fn output(&self, index: usize) -> Option<&Output> { self.outputs.get(index) }

    pub fn output_mut(&mut self, index: usize) -> Option<&mut Output> {
        self.outputs.get_mut(index)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Output> { self.outputs.iter() }

    pub fn outputs_mut(&mut self) -> impl Iterator<Item = &mut Output> { self.outputs.iter_mut() }

    /// Sum of the spent amounts. `None` if any of the inputs has no previous output data or the
    /// sum overflows.
    pub fn input_sum(&self) -> Option<Sats> {
        self.inputs().map(Input::value).try_fold(Sats::ZERO, |sum, value| sum.checked_add(value?))
    }

    /// Sum of the output amounts, `None` on overflow.
    pub fn output_sum(&self) -> Option<Sats> {
        self.outputs().map(Output::value).try_fold(Sats::ZERO, |sum, value| sum.checked_add(value))
    }

    /// Fee paid by the transaction. `None` if it can't be computed or the outputs exceed the
    /// inputs.
    pub fn fee(&self) -> Option<Sats> { self.input_sum()?.checked_sub(self.output_sum()?) }

    /// Whether any of the inputs has final scriptSig or witness.
    pub fn is_finalized(&self) -> bool { self.inputs().any(Input::is_finalized) }

    pub(crate) fn push_input(&mut self, mut input: Input) -> &mut Input {
        input.index = self.inputs.len();
        self.inputs.push(input);
        self.inputs.last_mut().expect("just pushed")
    }

    pub(crate) fn push_output(&mut self, mut output: Output) -> &mut Output {
        output.index = self.outputs.len();
        self.outputs.push(output);
        self.outputs.last_mut().expect("just pushed")
    }
}

mod display_from_str {
    use std::fmt::{self, Display, Formatter, LowerHex};
    use std::str::FromStr;

    use amplify::hex::{self, FromHex, ToHex};
    use base64::display::Base64Display;
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine;

    use super::*;
    use crate::PsbtError;

    #[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
    #[display(inner)]
    pub enum PsbtParseError {
        #[from]
        Hex(hex::Error),

        #[from]
        Base64(base64::DecodeError),

        #[from]
        Psbt(PsbtError),
    }

    impl Psbt {
        pub fn from_base64(s: &str) -> Result<Psbt, PsbtParseError> {
            Psbt::deserialize(BASE64_STANDARD.decode(s)?).map_err(PsbtParseError::from)
        }

        pub fn from_base16(s: &str) -> Result<Psbt, PsbtParseError> {
            let data = Vec::<u8>::from_hex(s)?;
            Psbt::deserialize(data).map_err(PsbtParseError::from)
        }

        pub fn to_base64(&self) -> String { BASE64_STANDARD.encode(self.serialize()) }

        pub fn to_base16(&self) -> String { self.serialize().to_hex() }
    }

    /// FromStr implementation parses both Base64 and Hex (Base16) encodings, ignoring the
    /// surrounding whitespace left by text files and copy-paste.
    impl FromStr for Psbt {
        type Err = PsbtParseError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let s = s.trim();
            match Vec::<u8>::from_hex(s) {
                // Text which is valid hex is never reinterpreted as Base64
                Ok(data) => Psbt::deserialize(data).map_err(PsbtParseError::from),
                Err(_) => Self::from_base64(s),
            }
        }
    }

    /// PSBT displays Base64-encoded string.
    impl Display for Psbt {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "{}", Base64Display::new(&self.serialize(), &BASE64_STANDARD))
        }
    }

    impl LowerHex for Psbt {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.to_base16()) }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Input {
    /// The index of this input. Used in error reporting.
    pub(crate) index: usize,

    /// Previous transaction outpoint to spent.
    pub previous_outpoint: Outpoint,

    /// Sequence number of this input.
    pub sequence_number: SeqNo,

    /// The non-witness transaction this input spends from.
    pub non_witness_tx: Option<Tx>,

    /// The transaction output this input spends from. Used for both segwit and legacy inputs,
    /// since it carries all the data required for signing.
    pub witness_utxo: Option<TxOut>,

    /// A map from public keys to their corresponding signature as would be pushed to the stack
    /// from a scriptSig or witness.
    pub partial_sigs: IndexMap<LegacyPk, LegacySig>,

    /// The sighash type to be used for this input. Signatures for this input must use the
    /// sighash type; if absent, `SIGHASH_ALL` is assumed.
    pub sighash_type: Option<SighashType>,

    /// The redeem script for this input.
    pub redeem_script: Option<RedeemScript>,

    /// The witness script for this input.
    pub witness_script: Option<WitnessScript>,

    /// The finalized, fully-constructed scriptSig with signatures and any other scripts necessary
    /// for this input to pass validation.
    pub final_script_sig: Option<SigScript>,

    /// The finalized, fully-constructed scriptWitness with signatures and any other scripts
    /// necessary for this input to pass validation.
    pub final_witness: Option<Witness>,

    /// Unknown keys
    pub unknown: UnknownMap,
}

impl Input {
    pub fn new(index: usize, previous_outpoint: Outpoint) -> Input {
        Input {
            index,
            previous_outpoint,
            sequence_number: SeqNo::from_consensus_u32(u32::MAX),
            non_witness_tx: None,
            witness_utxo: None,
            partial_sigs: none!(),
            sighash_type: None,
            redeem_script: None,
            witness_script: None,
            final_script_sig: None,
            final_witness: None,
            unknown: none!(),
        }
    }

    pub fn with_txin(txin: impl Into<UnsignedTxIn>, index: usize) -> Input {
        let txin = txin.into();
        let mut input = Input::new(index, txin.prev_output);
        input.sequence_number = txin.sequence;
        input
    }

    pub fn from_unsigned_txin((index, txin): (usize, UnsignedTxIn)) -> Input {
        Input::with_txin(txin, index)
    }

    pub fn to_unsigned_txin(&self) -> UnsignedTxIn {
        UnsignedTxIn {
            prev_output: self.previous_outpoint,
            sequence: self.sequence_number,
        }
    }

    /// Output spent by this input, taken from the witness UTXO or the non-witness transaction.
    /// `None` if neither is present or they contradict each other (see
    /// [`Input::checked_prevout`]).
    #[inline]
    pub fn prev_txout(&self) -> Option<&TxOut> { self.checked_prevout().ok() }

    pub fn value(&self) -> Option<Sats> { self.prev_txout().map(|txout| txout.value) }

    #[inline]
    pub fn index(&self) -> usize { self.index }

    #[inline]
    pub fn sighash_type(&self) -> SighashType { self.sighash_type.unwrap_or(SighashType::all()) }

    /// Whether the input has final scriptSig or witness, after which its signatures can't change.
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.final_script_sig.is_some() || self.final_witness.is_some()
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Output {
    /// The index of this output. Used in error reporting.
    pub(crate) index: usize,

    /// The output's amount.
    pub amount: Sats,

    /// The script for this output, also known as the scriptPubKey.
    pub script: ScriptPubkey,

    /// The redeem script for this output.
    pub redeem_script: Option<RedeemScript>,

    /// The witness script for this output.
    pub witness_script: Option<WitnessScript>,

    /// Unknown keys
    pub unknown: UnknownMap,
}

impl Output {
    pub fn new(index: usize, script: ScriptPubkey, amount: Sats) -> Self {
        Output {
            index,
            amount,
            script,
            redeem_script: None,
            witness_script: None,
            unknown: none!(),
        }
    }

    pub fn with_txout(txout: TxOut, index: usize) -> Self {
        Output::new(index, txout.script_pubkey, txout.value)
    }

    pub fn from_txout((index, txout): (usize, TxOut)) -> Self { Output::with_txout(txout, index) }

    pub fn to_txout(&self) -> TxOut {
        TxOut::new(self.script.clone(), self.amount)
    }

    #[inline]
    pub fn value(&self) -> Sats { self.amount }

    #[inline]
    pub fn index(&self) -> usize { self.index }
}
