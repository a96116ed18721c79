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

use amplify::hex::ToHex;
use amplify::Wrapper;
use bc::{
    ConsensusDecode, ConsensusDecodeError, ConsensusEncode, LegacyPk, LegacySig, Sats,
    ScriptBytes, SigScript, Tx, Txid, VarIntArray, Witness,
};

use crate::{Input, InputError, Psbt, ScriptTemplate};

/// Largest data size which is pushed to the stack with a single-byte length prefix.
const MAX_DIRECT_PUSH: usize = 75;
const OP_PUSHDATA1: u8 = 0x4C;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum FinalizeError {
    /// PSBT has no inputs and can't produce a valid transaction.
    NoInputs,

    /// input #{0} is already finalized.
    AlreadyFinal(usize),

    /// input #{index} lacks {missing} valid signature(s).
    IncompleteInput { index: usize, missing: usize },

    /// input #{0} is not finalized, so the transaction can't be extracted.
    NotFinalized(usize),

    #[from]
    #[display(inner)]
    Input(InputError),

    /// the value spent by input #{0} is not known, so the transaction fee can't be checked.
    UnknownInputValue(usize),

    /// the sum of transaction amounts overflows.
    AmountOverflow,

    /// transaction outputs spend {output_value} sats, exceeding {input_value} sats provided by
    /// the inputs.
    Overspend {
        input_value: Sats,
        output_value: Sats,
    },
}

/// Serialized signed transaction ready for broadcast, together with its id.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct RawTx {
    bytes: Vec<u8>,
    txid: Txid,
}

impl From<&Tx> for RawTx {
    fn from(tx: &Tx) -> Self {
        RawTx {
            bytes: tx.consensus_serialize(),
            txid: tx.txid(),
        }
    }
}

impl RawTx {
    /// Checks that the bytes hold exactly one well-formed transaction.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ConsensusDecodeError> {
        let tx = Tx::consensus_deserialize(&bytes)?;
        Ok(RawTx {
            txid: tx.txid(),
            bytes,
        })
    }

    pub fn txid(&self) -> Txid { self.txid }

    pub fn as_slice(&self) -> &[u8] { &self.bytes }

    pub fn into_vec(self) -> Vec<u8> { self.bytes }

    pub fn to_tx(&self) -> Tx {
        Tx::consensus_deserialize(&self.bytes).expect("raw transaction is checked on construction")
    }
}

impl AsRef<[u8]> for RawTx {
    fn as_ref(&self) -> &[u8] { &self.bytes }
}

impl Display for RawTx {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.bytes.to_hex()) }
}

impl Psbt {
    /// Produces final scriptSig or witness for every input.
    ///
    /// Either all the inputs get finalized, or an error is returned and nothing changes. Fails if
    /// any of the inputs is already finalized or lacks valid signatures.
    pub fn finalize_inputs(&self) -> Result<Psbt, FinalizeError> {
        if self.inputs.is_empty() {
            return Err(FinalizeError::NoInputs);
        }
        if let Some(input) = self.inputs().find(|input| input.is_finalized()) {
            return Err(FinalizeError::AlreadyFinal(input.index));
        }

        let mut sig_hasher = self.sighash_cache();
        for input in &self.inputs {
            let status = self.status_of(input, &mut sig_hasher)?;
            if !status.is_complete() {
                return Err(FinalizeError::IncompleteInput {
                    index: input.index,
                    missing: status.missing(),
                });
            }
        }
        self.check_amounts()?;

        let mut psbt = self.clone();
        for (input, target) in self.inputs.iter().zip(&mut psbt.inputs) {
            let template = input.template()?;
            let sigs = self.verified_sigs(input, &template, &mut sig_hasher)?;
            target.finalize_with(&template, &sigs)?;
        }
        Ok(psbt)
    }

    /// Extracts signed transaction from a PSBT where all inputs are finalized.
    pub fn extract(&self) -> Result<RawTx, FinalizeError> {
        if self.inputs.is_empty() {
            return Err(FinalizeError::NoInputs);
        }
        if let Some(input) = self.inputs().find(|input| !input.is_finalized()) {
            return Err(FinalizeError::NotFinalized(input.index));
        }
        let fee = self.check_amounts()?;

        let tx = Tx::from(self.to_unsigned_tx());
        let inputs = tx
            .inputs
            .iter()
            .zip(&self.inputs)
            .map(|(txin, input)| {
                let mut txin = txin.clone();
                txin.sig_script = input.final_script_sig.clone().unwrap_or_else(SigScript::new);
                txin.witness = input.final_witness.clone().unwrap_or_else(Witness::new);
                txin
            })
            .collect::<Vec<_>>();
        let tx = Tx {
            inputs: VarIntArray::from_collection_unsafe(inputs),
            ..tx
        };

        let raw_tx = RawTx::from(&tx);
        debug!("extracted transaction {} paying {fee} sats of fee", raw_tx.txid());
        Ok(raw_tx)
    }

    /// Finalizes all the inputs and extracts the signed transaction.
    pub fn finalize(&self) -> Result<RawTx, FinalizeError> { self.finalize_inputs()?.extract() }

    fn check_amounts(&self) -> Result<Sats, FinalizeError> {
        let mut input_value = Sats::ZERO;
        for input in &self.inputs {
            let value = input.value().ok_or(FinalizeError::UnknownInputValue(input.index))?;
            input_value = input_value.checked_add(value).ok_or(FinalizeError::AmountOverflow)?;
        }
        let output_value = self.output_sum().ok_or(FinalizeError::AmountOverflow)?;
        input_value.checked_sub(output_value).ok_or(FinalizeError::Overspend {
            input_value,
            output_value,
        })
    }
}

impl Input {
    fn finalize_with(
        &mut self,
        template: &ScriptTemplate,
        sigs: &[(LegacyPk, LegacySig)],
    ) -> Result<(), FinalizeError> {
        match template {
            ScriptTemplate::P2pkh { .. } => {
                let (pk, sig) = sigs.first().ok_or(FinalizeError::IncompleteInput {
                    index: self.index,
                    missing: 1,
                })?;
                self.final_script_sig = Some(p2pkh_sig_script(pk, sig));
            }
            ScriptTemplate::P2wshMulti {
                witness_script,
                multisig,
            } => {
                let threshold = multisig.threshold();
                if sigs.len() < threshold {
                    return Err(FinalizeError::IncompleteInput {
                        index: self.index,
                        missing: threshold - sigs.len(),
                    });
                }
                // CHECKMULTISIG pops one extra stack element
                let mut stack = Vec::with_capacity(threshold + 2);
                stack.push(vec![]);
                stack.extend(sigs.iter().take(threshold).map(|(_, sig)| sig.to_vec()));
                stack.push(witness_script.as_slice().to_vec());
                self.final_witness = Some(Witness::from_consensus_stack(stack));
            }
        }
        debug!("finalized input #{} with {} signature(s)", self.index, template.required_sigs());
        Ok(())
    }
}

fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    if data.len() > MAX_DIRECT_PUSH {
        script.push(OP_PUSHDATA1);
    }
    script.push(data.len() as u8);
    script.extend_from_slice(data);
}

/// Builds `<sig> <pubkey>` scriptSig spending P2PKH output.
pub(crate) fn p2pkh_sig_script(pk: &LegacyPk, sig: &LegacySig) -> SigScript {
    let mut script = Vec::with_capacity(2 + 73 + 65);
    push_data(&mut script, &sig.to_vec());
    push_data(&mut script, &pk.to_vec());
    SigScript::from_inner(
        ScriptBytes::try_from(script).expect("signature and key pushes fit script size limit"),
    )
}
