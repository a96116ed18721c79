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
use bc::{LegacyPk, OpCode, WitnessScript};

/// Maximal number of keys in a `CHECKMULTISIG` template produced or accepted here.
pub const MAX_MULTISIG_KEYS: usize = 16;

const OP_PUSHNUM_1: u8 = 0x51;
const OP_PUSHNUM_16: u8 = 0x60;
const OP_CHECKMULTISIG: u8 = 0xAE;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum MultisigError {
    /// multisig threshold {threshold} is invalid for {keys} keys.
    InvalidThreshold { threshold: usize, keys: usize },

    /// multisig with {0} keys exceeds the limit of 16 keys.
    TooManyKeys(usize),

    /// multisig can't use uncompressed public keys in a witness script.
    UncompressedKey,

    /// multisig contains the same public key more than once.
    RepeatedKey,

    /// script is not a `CHECKMULTISIG` template.
    NotMultisig,
}

/// `M`-of-`N` bare `CHECKMULTISIG` template:
/// `OP_M <pk_1> ... <pk_N> OP_N OP_CHECKMULTISIG`.
///
/// Key order is the order of the keys in the script; signatures satisfying the template must
/// follow the same order.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Multisig {
    threshold: usize,
    keys: Vec<LegacyPk>,
}

impl Multisig {
    /// Constructs template keeping the key order as provided.
    pub fn new(
        threshold: usize,
        keys: impl IntoIterator<Item = LegacyPk>,
    ) -> Result<Self, MultisigError> {
        let keys = keys.into_iter().collect::<Vec<_>>();
        if keys.len() > MAX_MULTISIG_KEYS {
            return Err(MultisigError::TooManyKeys(keys.len()));
        }
        if threshold == 0 || threshold > keys.len() {
            return Err(MultisigError::InvalidThreshold {
                threshold,
                keys: keys.len(),
            });
        }
        if keys.iter().any(|pk| !pk.compressed) {
            return Err(MultisigError::UncompressedKey);
        }
        for (pos, pk) in keys.iter().enumerate() {
            if keys[..pos].contains(pk) {
                return Err(MultisigError::RepeatedKey);
            }
        }
        Ok(Multisig { threshold, keys })
    }

    /// Constructs template with keys in lexicographic order of their serialization (BIP-67).
    pub fn sorted(
        threshold: usize,
        keys: impl IntoIterator<Item = LegacyPk>,
    ) -> Result<Self, MultisigError> {
        let mut keys = keys.into_iter().collect::<Vec<_>>();
        keys.sort_by_key(|pk| pk.pubkey.serialize());
        Self::new(threshold, keys)
    }

    pub fn threshold(&self) -> usize { self.threshold }

    pub fn keys(&self) -> &[LegacyPk] { &self.keys }

    /// Position of the key in the script, if the key participates in the template.
    pub fn key_position(&self, pk: &LegacyPk) -> Option<usize> {
        self.keys.iter().position(|key| key == pk)
    }

    pub fn to_witness_script(&self) -> WitnessScript {
        let mut script = WitnessScript::with_capacity(self.keys.len() * 34 + 3);
        script.push_num(self.threshold as u8);
        for pk in &self.keys {
            script.push_slice(&pk.pubkey.serialize());
        }
        script.push_num(self.keys.len() as u8);
        script.push_opcode(OpCode::CheckMultiSig);
        script
    }

    /// Parses a witness script which must exactly match the template, with minimal pushes only.
    pub fn from_script(script: &WitnessScript) -> Result<Self, MultisigError> {
        let [m, pushes @ .., n, OP_CHECKMULTISIG] = script.as_slice() else {
            return Err(MultisigError::NotMultisig);
        };
        let (Some(m), Some(n)) = (small_num(*m), small_num(*n)) else {
            return Err(MultisigError::NotMultisig);
        };
        let mut keys = Vec::with_capacity(n);
        let mut body = pushes;
        while let Some((&len, rest)) = body.split_first() {
            match len as usize {
                33 if rest.len() >= 33 => {
                    let pubkey = PublicKey::from_slice(&rest[..33])
                        .map_err(|_| MultisigError::NotMultisig)?;
                    keys.push(LegacyPk::compressed(pubkey));
                    body = &rest[33..];
                }
                65 if rest.len() >= 65 => return Err(MultisigError::UncompressedKey),
                _ => return Err(MultisigError::NotMultisig),
            }
        }
        if keys.len() != n {
            return Err(MultisigError::NotMultisig);
        }
        Multisig::new(m, keys)
    }
}

fn small_num(op: u8) -> Option<usize> {
    (OP_PUSHNUM_1..=OP_PUSHNUM_16)
        .contains(&op)
        .then(|| (op - OP_PUSHNUM_1) as usize + 1)
}
