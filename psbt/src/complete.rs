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

use bc::secp256k1::{Message, SECP256K1};
use bc::{LegacyPk, LegacySig, SighashCache, TxOut};

use crate::{Input, InputError, Psbt, ScriptTemplate, SignError};

/// Signing progress of a single input.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display("{valid}/{required} valid signature(s), finalized: {finalized}")]
pub struct InputStatus {
    /// Number of valid signatures the spent script requires.
    pub required: usize,
    /// Number of partial signatures which belong to the script keys, use the declared sighash
    /// type and verify against the input sighash.
    pub valid: usize,
    pub finalized: bool,
}

impl InputStatus {
    pub fn is_complete(&self) -> bool { self.finalized || self.valid >= self.required }

    pub fn missing(&self) -> usize {
        match self.finalized {
            true => 0,
            false => self.required.saturating_sub(self.valid),
        }
    }
}

impl Psbt {
    /// Reports how many valid signatures input `index` has and needs.
    ///
    /// Signatures are verified: a present but invalid signature doesn't count.
    pub fn input_status(&self, index: usize) -> Result<InputStatus, InputError> {
        let input = self.checked_input(index)?;
        self.status_of(input, &mut self.sighash_cache())
    }

    /// Whether every input is either finalized or has enough valid signatures to be finalized.
    /// PSBT without inputs is never complete.
    pub fn is_complete(&self) -> bool {
        let mut sig_hasher = self.sighash_cache();
        !self.inputs.is_empty()
            && self.inputs().all(|input| {
                self.status_of(input, &mut sig_hasher).is_ok_and(|status| status.is_complete())
            })
    }

    /// Lists inputs which still lack signatures together with the number of missing valid
    /// signatures. Inputs which can't be analyzed (no previous output, unsupported script etc.)
    /// are reported as missing a single signature.
    pub fn missing(&self) -> Vec<(usize, usize)> {
        let mut sig_hasher = self.sighash_cache();
        self.inputs()
            .filter_map(|input| {
                let missing = match self.status_of(input, &mut sig_hasher) {
                    Ok(status) => status.missing(),
                    Err(err) => {
                        debug!("{err}");
                        1
                    }
                };
                (missing > 0).then_some((input.index, missing))
            })
            .collect()
    }

    pub(crate) fn status_of(
        &self,
        input: &Input,
        sig_hasher: &mut SighashCache<TxOut>,
    ) -> Result<InputStatus, InputError> {
        if input.is_finalized() {
            return Ok(InputStatus {
                required: 0,
                valid: 0,
                finalized: true,
            });
        }
        let template = input.template()?;
        let valid = self.verified_sigs(input, &template, sig_hasher)?.len();
        Ok(InputStatus {
            required: template.required_sigs(),
            valid,
            finalized: false,
        })
    }

    /// Partial signatures of `input` which satisfy the template, ordered as the keys appear in
    /// the script.
    pub(crate) fn verified_sigs(
        &self,
        input: &Input,
        template: &ScriptTemplate,
        sig_hasher: &mut SighashCache<TxOut>,
    ) -> Result<Vec<(LegacyPk, LegacySig)>, InputError> {
        if input.partial_sigs.is_empty() {
            return Ok(vec![]);
        }

        let index = input.index;
        let sighash_type = input.sighash_type();
        let sighash = match self.sighash(index, template, sig_hasher) {
            Ok(sighash) => sighash,
            Err(SignError::Input(err)) => return Err(err),
            Err(err) => {
                warn!("no signature of input #{index} can be valid: {err}");
                return Ok(vec![]);
            }
        };
        let msg = Message::from(sighash);

        let mut sigs = input
            .partial_sigs
            .iter()
            .filter(|(pk, sig)| {
                if !template.has_key(pk) {
                    debug!("input #{index} has signature by {} not used in the script", pk.pubkey);
                    return false;
                }
                if sig.sighash_type != sighash_type {
                    warn!(
                        "signature by {} on input #{index} uses {:?} instead of {sighash_type:?}",
                        pk.pubkey, sig.sighash_type
                    );
                    return false;
                }
                if SECP256K1.verify_ecdsa(&msg, &sig.sig, &pk.pubkey).is_err() {
                    warn!("signature by {} on input #{index} is invalid", pk.pubkey);
                    return false;
                }
                true
            })
            .map(|(pk, sig)| (*pk, sig.clone()))
            .collect::<Vec<_>>();

        if let ScriptTemplate::P2wshMulti { multisig, .. } = template {
            sigs.sort_by_key(|(pk, _)| multisig.key_position(pk));
        }
        Ok(sigs)
    }
}
