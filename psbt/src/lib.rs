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

//! Partially signed bitcoin transactions (BIP-174, version 0) and the roles working with them:
//! creator, signer, combiner and finalizer.

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;

mod keys;
mod maps;
mod coders;
mod data;
mod multisig;
mod template;
mod sign;
mod complete;
mod combine;
mod finalize;
mod constructor;

pub use coders::{Decode, DecodeError, Encode, PsbtError};
pub use combine::CombineError;
pub use complete::InputStatus;
pub use constructor::{
    Beneficiary, BeneficiaryParseError, Change, ConstructionError, Payment, PsbtMeta, TxParams,
    Utxo, SEQ_ENABLE_LOCKTIME,
};
pub use data::{Input, Output, Psbt, PsbtParseError, UnsignedTx, UnsignedTxIn};
pub use finalize::{FinalizeError, RawTx};
pub use keys::{GlobalKey, InputKey, KeyPair, KeyType, OutputKey};
pub use maps::{KeyData, Map, MapName, UnknownMap, ValueData};
pub use sign::{Rejected, Sign, SignError, Signer};
pub use multisig::{Multisig, MultisigError, MAX_MULTISIG_KEYS};
pub use template::{pubkey_hash_of, InputError, ScriptTemplate};
