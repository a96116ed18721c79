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

//! Interfaces of the network services which accept the final transaction and report its
//! confirmation. Implementations (HTTP explorers, node RPC) live outside of this crate.

use std::thread;
use std::time::Duration;

use bc::{BlockHash, Txid};
use psbt::RawTx;

#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum BroadcastError {
    /// transaction was rejected by the network: {0}
    Rejected(String),

    /// unable to reach the network service: {0}
    Transport(String),
}

/// Errors waiting for a transaction confirmation.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum WaitError {
    /// transaction {txid} is not confirmed after {attempts} status checks.
    Timeout { txid: Txid, attempts: u32 },

    /// status of transaction {txid} is unknown since the last check failed: {error}
    Unavailable { txid: Txid, error: BroadcastError },
}

/// Confirmation state of a transaction reported by a [`TxStatusSource`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase", tag = "status")
)]
pub enum TxStatus {
    #[display("unconfirmed")]
    Unconfirmed,

    #[display("confirmed in block {block_hash} at height {height}")]
    Confirmed { height: u32, block_hash: BlockHash },
}

impl TxStatus {
    pub fn is_confirmed(&self) -> bool { matches!(self, TxStatus::Confirmed { .. }) }
}

/// Service accepting raw transactions for relay.
pub trait Broadcast {
    /// Submits the transaction and returns its id as reported by the service.
    fn submit(&self, tx: &RawTx) -> Result<Txid, BroadcastError>;
}

/// Service reporting whether a transaction got mined.
pub trait TxStatusSource {
    fn poll(&self, txid: &Txid) -> Result<TxStatus, BroadcastError>;
}

impl<T: Broadcast + ?Sized> Broadcast for &T {
    fn submit(&self, tx: &RawTx) -> Result<Txid, BroadcastError> { (*self).submit(tx) }
}

impl<T: TxStatusSource + ?Sized> TxStatusSource for &T {
    fn poll(&self, txid: &Txid) -> Result<TxStatus, BroadcastError> { (*self).poll(txid) }
}

/// How [`wait_confirmation`] polls for the transaction status.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct PollConfig {
    /// Pause between two status checks.
    pub interval: Duration,
    /// Number of status checks after which waiting gives up.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: Duration::from_secs(15),
            max_attempts: 240,
        }
    }
}

/// Polls `source` until the transaction gets confirmed, sleeping for `config.interval` between
/// the checks.
///
/// Failed checks are logged and retried: only running out of `config.max_attempts` stops the
/// waiting. Returns the height and hash of the block containing the transaction.
pub fn wait_confirmation(
    source: &impl TxStatusSource,
    txid: Txid,
    config: &PollConfig,
) -> Result<(u32, BlockHash), WaitError> {
    let mut last_error = None;
    for attempt in 1..=config.max_attempts {
        match source.poll(&txid) {
            Ok(TxStatus::Confirmed { height, block_hash }) => {
                info!("transaction {txid} is confirmed in block {block_hash} at height {height}");
                return Ok((height, block_hash));
            }
            Ok(TxStatus::Unconfirmed) => {
                debug!("transaction {txid} is unconfirmed (check {attempt})");
                last_error = None;
            }
            Err(err) => {
                warn!("status check {attempt} of transaction {txid} failed: {err}");
                last_error = Some(err);
            }
        }
        if attempt < config.max_attempts {
            thread::sleep(config.interval);
        }
    }
    Err(match last_error {
        Some(error) => WaitError::Unavailable { txid, error },
        None => WaitError::Timeout {
            txid,
            attempts: config.max_attempts,
        },
    })
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use amplify::ByteArray;

    use super::*;

    struct Script {
        statuses: Vec<Result<TxStatus, BroadcastError>>,
        calls: Cell<usize>,
    }

    impl TxStatusSource for Script {
        fn poll(&self, _txid: &Txid) -> Result<TxStatus, BroadcastError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            self.statuses[call.min(self.statuses.len() - 1)].clone()
        }
    }

    fn config(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::ZERO,
            max_attempts,
        }
    }

    #[test]
    fn retries_failed_checks() {
        let block_hash = BlockHash::from_byte_array([7; 32]);
        let source = Script {
            statuses: vec![
                Err(BroadcastError::Transport(s!("timeout"))),
                Ok(TxStatus::Unconfirmed),
                Ok(TxStatus::Confirmed {
                    height: 800_000,
                    block_hash,
                }),
            ],
            calls: Cell::new(0),
        };
        let txid = Txid::from_byte_array([1; 32]);
        assert_eq!(wait_confirmation(&source, txid, &config(5)), Ok((800_000, block_hash)));
        assert_eq!(source.calls.get(), 3);
    }

    #[test]
    fn gives_up() {
        let txid = Txid::from_byte_array([1; 32]);
        let source = Script {
            statuses: vec![Ok(TxStatus::Unconfirmed)],
            calls: Cell::new(0),
        };
        assert_eq!(
            wait_confirmation(&source, txid, &config(3)),
            Err(WaitError::Timeout { txid, attempts: 3 })
        );
        assert_eq!(source.calls.get(), 3);

        let failing = Script {
            statuses: vec![Err(BroadcastError::Transport(s!("connection refused")))],
            calls: Cell::new(0),
        };
        assert_eq!(
            wait_confirmation(&failing, txid, &config(2)),
            Err(WaitError::Unavailable {
                txid,
                error: BroadcastError::Transport(s!("connection refused"))
            })
        );
    }

    #[test]
    fn status_display() {
        assert_eq!(TxStatus::Unconfirmed.to_string(), "unconfirmed");
        assert!(!TxStatus::Unconfirmed.is_confirmed());
    }
}
