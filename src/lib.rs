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

//! Offline multi-party signing of bitcoin transactions.
//!
//! The crate re-exports transaction primitives from [`bc`] and the PSBT workflow from
//! [`psbt`], and adds what sits around the core: a signer holding private keys behind an
//! approval policy, and the interfaces of the network collaborators which broadcast the final
//! transaction and report its confirmation.

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod signers;
mod broadcast;

pub use broadcast::{
    wait_confirmation, Broadcast, BroadcastError, PollConfig, TxStatus, TxStatusSource, WaitError,
};
pub use bc::{self, secp256k1, *};
pub use psbt::{self, Psbt, PsbtParseError, RawTx, Rejected, Sign, SignError, Signer};
pub use signers::{KeySigner, SignerPolicy};
