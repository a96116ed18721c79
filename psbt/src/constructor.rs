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

use std::fmt::{self, Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;

use amplify::hex::{self, FromHex, ToHex};
use amplify::{confinement, Wrapper};
use bc::{
    LockTime, Outpoint, RedeemScript, Sats, ScriptBytes, ScriptPubkey, SeqNo, TxOut, TxVer, Vout,
    WitnessScript,
};

use crate::{Input, Output, Psbt, UnsignedTx};

/// Sequence number which is not final, so the lock time is enforced, but doesn't signal RBF.
pub const SEQ_ENABLE_LOCKTIME: u32 = 0xFFFF_FFFE;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ConstructionError {
    /// impossible to construct transaction having no inputs.
    NoInputs,

    /// output {0} is spent twice by the transaction.
    DuplicateInput(Outpoint),

    /// the total amount exceeds number of sats in existence.
    Overflow,

    /// attempt to spend more than present in transaction inputs. Total transaction inputs are
    /// {input_value} sats, but output is {output_value} sats.
    OutputExceedsInputs {
        input_value: Sats,
        output_value: Sats,
    },

    /// not enough funds to pay fee of {fee} sats; the sum of inputs is {input_value} sats, and
    /// outputs spends {output_value} sats out of them.
    NoFundsForFee {
        input_value: Sats,
        output_value: Sats,
        fee: Sats,
    },

    /// change of {change} sats is below the dust limit of {dust_limit} sats; adjust the fee or
    /// the payments.
    DustChange { change: Sats, dust_limit: Sats },

    /// inputs exceed outputs and fee by {excess} sats, but no change output is provided.
    UnbalancedAmounts { excess: Sats },
}

#[derive(Clone, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum BeneficiaryParseError {
    #[display("invalid format of the beneficiary, which must be `<amount>@<script_pubkey_hex>`")]
    InvalidFormat,

    /// invalid payment amount: {0}
    #[from]
    Int(ParseIntError),

    /// invalid beneficiary script: {0}
    #[from]
    Script(hex::Error),

    /// beneficiary script is too large: {0}
    #[from]
    ScriptSize(confinement::Error),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, From)]
pub enum Payment {
    #[from]
    #[display(inner)]
    Fixed(Sats),
    #[display("MAX")]
    Max,
}

impl Payment {
    #[inline]
    pub fn sats(&self) -> Option<Sats> {
        match self {
            Payment::Fixed(sats) => Some(*sats),
            Payment::Max => None,
        }
    }

    #[inline]
    pub fn unwrap_or(&self, default: impl Into<Sats>) -> Sats {
        self.sats().unwrap_or(default.into())
    }

    #[inline]
    pub fn is_max(&self) -> bool { *self == Payment::Max }
}

impl FromStr for Payment {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "MAX" {
            return Ok(Payment::Max);
        }
        Sats::from_str(s).map(Payment::Fixed)
    }
}

/// Payment receiver: output script and the amount, which may be "everything left after the
/// fee".
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Beneficiary {
    pub script_pubkey: ScriptPubkey,
    pub amount: Payment,
}

impl Beneficiary {
    #[inline]
    pub fn new(script_pubkey: ScriptPubkey, amount: impl Into<Payment>) -> Self {
        Beneficiary {
            script_pubkey,
            amount: amount.into(),
        }
    }
    #[inline]
    pub fn with_max(script_pubkey: ScriptPubkey) -> Self {
        Beneficiary {
            script_pubkey,
            amount: Payment::Max,
        }
    }
    #[inline]
    pub fn is_max(&self) -> bool { self.amount.is_max() }
}

impl Display for Beneficiary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.amount, self.script_pubkey.as_slice().to_hex())
    }
}

impl FromStr for Beneficiary {
    type Err = BeneficiaryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, beneficiary) =
            s.split_once('@').ok_or(BeneficiaryParseError::InvalidFormat)?;
        let script = ScriptBytes::try_from(Vec::<u8>::from_hex(beneficiary)?)?;
        let script_pubkey = ScriptPubkey::from_inner(script);
        Ok(Beneficiary::new(script_pubkey, Payment::from_str(amount)?))
    }
}

/// Output receiving the funds left after paying beneficiaries and the fee.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Change {
    pub script_pubkey: ScriptPubkey,
    /// Witness script of a P2WSH change output, kept in the output map for the signers to verify
    /// the change.
    pub witness_script: Option<WitnessScript>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct TxParams {
    /// Fee paid by the transaction. It is never adjusted: the transaction either pays exactly
    /// this fee or can't be constructed.
    pub fee: Sats,
    pub lock_time: LockTime,
    pub seq_no: SeqNo,
    pub change: Option<Change>,
    pub dust_limit: Sats,
}

impl TxParams {
    /// Smallest change amount, in sats, which is still relayed by the network.
    pub const DUST_LIMIT: u64 = 546;

    pub fn with(fee: Sats) -> Self {
        TxParams {
            fee,
            lock_time: LockTime::ZERO,
            seq_no: SeqNo::from_consensus_u32(SEQ_ENABLE_LOCKTIME),
            change: None,
            dust_limit: Sats::from(Self::DUST_LIMIT),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct PsbtMeta {
    pub change_vout: Option<Vout>,
}

/// Coin to be spent: the outpoint together with the output it refers to and the scripts required
/// to sign it.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Utxo {
    pub outpoint: Outpoint,
    pub txout: TxOut,
    pub witness_script: Option<WitnessScript>,
    pub redeem_script: Option<RedeemScript>,
}

impl Utxo {
    pub fn new(outpoint: Outpoint, txout: TxOut) -> Self {
        Utxo {
            outpoint,
            txout,
            witness_script: None,
            redeem_script: None,
        }
    }

    pub fn with_witness_script(mut self, witness_script: WitnessScript) -> Self {
        self.witness_script = Some(witness_script);
        self
    }

    #[inline]
    pub fn value(&self) -> Sats { self.txout.value }
}

impl Psbt {
    /// Creates unsigned PSBT spending `coins` to `beneficiaries` and paying exactly `params.fee`.
    ///
    /// Amounts of [`Payment::Max`] beneficiaries split everything left after the fixed payments
    /// and the fee. Otherwise the leftover goes to the change output, if any.
    pub fn construct(
        coins: impl IntoIterator<Item = Utxo>,
        beneficiaries: impl IntoIterator<Item = Beneficiary>,
        params: TxParams,
    ) -> Result<(Psbt, PsbtMeta), ConstructionError> {
        let mut psbt = Psbt::from_tx(UnsignedTx {
            version: TxVer::V2,
            inputs: vec![],
            outputs: vec![],
            lock_time: params.lock_time,
        });

        // 1. Add inputs
        let mut input_value = Sats::ZERO;
        for coin in coins {
            if psbt.inputs().any(|inp| inp.previous_outpoint == coin.outpoint) {
                return Err(ConstructionError::DuplicateInput(coin.outpoint));
            }
            input_value.checked_add_assign(coin.value()).ok_or(ConstructionError::Overflow)?;
            let input = psbt.push_input(Input::new(0, coin.outpoint));
            input.sequence_number = params.seq_no;
            input.witness_utxo = Some(coin.txout);
            input.witness_script = coin.witness_script;
            input.redeem_script = coin.redeem_script;
        }
        if psbt.inputs.is_empty() {
            return Err(ConstructionError::NoInputs);
        }

        // 2. Add outputs
        let mut max = Vec::new();
        let mut output_value = Sats::ZERO;
        for beneficiary in beneficiaries {
            let amount = beneficiary.amount.unwrap_or(Sats::ZERO);
            output_value.checked_add_assign(amount).ok_or(ConstructionError::Overflow)?;
            let out = psbt.push_output(Output::new(0, beneficiary.script_pubkey, amount));
            if beneficiary.amount.is_max() {
                max.push(out.index());
            }
        }
        let mut remaining_value = input_value
            .checked_sub(output_value)
            .ok_or(ConstructionError::OutputExceedsInputs {
                input_value,
                output_value,
            })?
            .checked_sub(params.fee)
            .ok_or(ConstructionError::NoFundsForFee {
                input_value,
                output_value,
                fee: params.fee,
            })?;
        if !max.is_empty() {
            let count = max.len() as u64;
            let portion = remaining_value.sats() / count;
            let mut remainder = remaining_value.sats() % count;
            for out in psbt.outputs_mut() {
                if max.contains(&out.index()) {
                    out.amount = Sats::from(portion + remainder);
                    remainder = 0;
                }
            }
            remaining_value = Sats::ZERO;
        }

        // 3. Add change; the fee is never adjusted to absorb it
        let mut meta = PsbtMeta { change_vout: None };
        if remaining_value > Sats::ZERO {
            let change = params.change.ok_or(ConstructionError::UnbalancedAmounts {
                excess: remaining_value,
            })?;
            if remaining_value < params.dust_limit {
                return Err(ConstructionError::DustChange {
                    change: remaining_value,
                    dust_limit: params.dust_limit,
                });
            }
            let out = psbt.push_output(Output::new(0, change.script_pubkey, remaining_value));
            out.witness_script = change.witness_script;
            meta.change_vout = Some(Vout::from_u32(out.index() as u32));
        }

        debug!(
            "constructed transaction {} spending {input_value} sats with {} sats of fee",
            psbt.txid(),
            params.fee
        );
        Ok((psbt, meta))
    }
}
