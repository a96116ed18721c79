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

use std::fmt::Debug;
use std::hash::Hash;
use std::io::Sink;

use bc::VarInt;

use crate::{Encode, KeyData, ValueData};

pub trait KeyType: Copy + Ord + Eq + Hash + Debug + 'static {
    /// Key types which are interpreted by this library. All other key types are kept as opaque
    /// unknown keys.
    const STANDARD: &'static [Self];
    fn from_u8(val: u8) -> Self;
    fn into_u8(self) -> u8;
    fn to_u8(&self) -> u8 { self.into_u8() }
    fn has_key_data(self) -> bool;
    #[inline]
    fn is_standard(self) -> bool { Self::STANDARD.contains(&self) }
}

const PSBT_GLOBAL_UNSIGNED_TX: u8 = 0x00;
const PSBT_GLOBAL_VERSION: u8 = 0xFB;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum GlobalKey {
    /// `PSBT_GLOBAL_UNSIGNED_TX`
    UnsignedTx,

    /// `PSBT_GLOBAL_VERSION`
    Version,

    /// All unknown keys, including BIP-32 xpubs and proprietary keys.
    Unknown(u8),
}

impl KeyType for GlobalKey {
    const STANDARD: &'static [Self] = &[Self::UnsignedTx, Self::Version];

    fn from_u8(val: u8) -> Self {
        match val {
            PSBT_GLOBAL_UNSIGNED_TX => Self::UnsignedTx,
            PSBT_GLOBAL_VERSION => Self::Version,
            unknown => Self::Unknown(unknown),
        }
    }

    fn into_u8(self) -> u8 {
        match self {
            GlobalKey::UnsignedTx => PSBT_GLOBAL_UNSIGNED_TX,
            GlobalKey::Version => PSBT_GLOBAL_VERSION,
            GlobalKey::Unknown(key_type) => key_type,
        }
    }

    fn has_key_data(self) -> bool {
        match self {
            GlobalKey::UnsignedTx => false,
            GlobalKey::Version => false,
            GlobalKey::Unknown(_) => true,
        }
    }
}

const PSBT_IN_NON_WITNESS_UTXO: u8 = 0x00;
const PSBT_IN_WITNESS_UTXO: u8 = 0x01;
const PSBT_IN_PARTIAL_SIG: u8 = 0x02;
const PSBT_IN_SIGHASH_TYPE: u8 = 0x03;
const PSBT_IN_REDEEM_SCRIPT: u8 = 0x04;
const PSBT_IN_WITNESS_SCRIPT: u8 = 0x05;
const PSBT_IN_FINAL_SCRIPTSIG: u8 = 0x07;
const PSBT_IN_FINAL_SCRIPTWITNESS: u8 = 0x08;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum InputKey {
    /// `PSBT_IN_NON_WITNESS_UTXO`
    NonWitnessUtxo,

    /// `PSBT_IN_WITNESS_UTXO`
    WitnessUtxo,

    /// `PSBT_IN_PARTIAL_SIG`
    PartialSig,

    /// `PSBT_IN_SIGHASH_TYPE`
    SighashType,

    /// `PSBT_IN_REDEEM_SCRIPT`
    RedeemScript,

    /// `PSBT_IN_WITNESS_SCRIPT`
    WitnessScript,

    /// `PSBT_IN_FINAL_SCRIPTSIG`
    FinalScriptSig,

    /// `PSBT_IN_FINAL_SCRIPTWITNESS`
    FinalWitness,

    /// All unknown keys
    Unknown(u8),
}

impl KeyType for InputKey {
    const STANDARD: &'static [Self] = &[
        Self::NonWitnessUtxo,
        Self::WitnessUtxo,
        Self::PartialSig,
        Self::SighashType,
        Self::RedeemScript,
        Self::WitnessScript,
        Self::FinalScriptSig,
        Self::FinalWitness,
    ];

    fn from_u8(val: u8) -> Self {
        match val {
            PSBT_IN_NON_WITNESS_UTXO => Self::NonWitnessUtxo,
            PSBT_IN_WITNESS_UTXO => Self::WitnessUtxo,
            PSBT_IN_PARTIAL_SIG => Self::PartialSig,
            PSBT_IN_SIGHASH_TYPE => Self::SighashType,
            PSBT_IN_REDEEM_SCRIPT => Self::RedeemScript,
            PSBT_IN_WITNESS_SCRIPT => Self::WitnessScript,
            PSBT_IN_FINAL_SCRIPTSIG => Self::FinalScriptSig,
            PSBT_IN_FINAL_SCRIPTWITNESS => Self::FinalWitness,
            unknown => Self::Unknown(unknown),
        }
    }

    fn into_u8(self) -> u8 {
        match self {
            InputKey::NonWitnessUtxo => PSBT_IN_NON_WITNESS_UTXO,
            InputKey::WitnessUtxo => PSBT_IN_WITNESS_UTXO,
            InputKey::PartialSig => PSBT_IN_PARTIAL_SIG,
            InputKey::SighashType => PSBT_IN_SIGHASH_TYPE,
            InputKey::RedeemScript => PSBT_IN_REDEEM_SCRIPT,
            InputKey::WitnessScript => PSBT_IN_WITNESS_SCRIPT,
            InputKey::FinalScriptSig => PSBT_IN_FINAL_SCRIPTSIG,
            InputKey::FinalWitness => PSBT_IN_FINAL_SCRIPTWITNESS,
            InputKey::Unknown(key_type) => key_type,
        }
    }

    fn has_key_data(self) -> bool {
        match self {
            InputKey::NonWitnessUtxo => false,
            InputKey::WitnessUtxo => false,
            InputKey::PartialSig => true,
            InputKey::SighashType => false,
            InputKey::RedeemScript => false,
            InputKey::WitnessScript => false,
            InputKey::FinalScriptSig => false,
            InputKey::FinalWitness => false,
            InputKey::Unknown(_) => true,
        }
    }
}

const PSBT_OUT_REDEEM_SCRIPT: u8 = 0x00;
const PSBT_OUT_WITNESS_SCRIPT: u8 = 0x01;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum OutputKey {
    /// `PSBT_OUT_REDEEM_SCRIPT`
    RedeemScript,

    /// `PSBT_OUT_WITNESS_SCRIPT`
    WitnessScript,

    /// All unknown keys
    Unknown(u8),
}

impl KeyType for OutputKey {
    const STANDARD: &'static [Self] = &[Self::RedeemScript, Self::WitnessScript];

    fn from_u8(val: u8) -> Self {
        match val {
            PSBT_OUT_REDEEM_SCRIPT => Self::RedeemScript,
            PSBT_OUT_WITNESS_SCRIPT => Self::WitnessScript,
            unknown => Self::Unknown(unknown),
        }
    }

    fn into_u8(self) -> u8 {
        match self {
            OutputKey::RedeemScript => PSBT_OUT_REDEEM_SCRIPT,
            OutputKey::WitnessScript => PSBT_OUT_WITNESS_SCRIPT,
            OutputKey::Unknown(key_type) => key_type,
        }
    }

    fn has_key_data(self) -> bool {
        match self {
            OutputKey::RedeemScript => false,
            OutputKey::WitnessScript => false,
            OutputKey::Unknown(_) => true,
        }
    }
}

pub enum KeyValue<T: KeyType> {
    Pair(KeyPair<T, KeyData, ValueData>),
    Separator,
}

pub struct KeyPair<T: KeyType, K, V> {
    pub key_type: T,
    pub key_data: K,
    pub value_data: V,
}

impl<T: KeyType, K, V> KeyPair<T, K, V> {
    pub fn new(key_type: T, key_data: K, value_data: V) -> Self {
        Self {
            key_type,
            key_data,
            value_data,
        }
    }

    pub fn key_len(&self) -> VarInt
    where K: Encode {
        let mut sink = Sink::default();
        let count = self.key_data.encode(&mut sink).expect("sink write doesn't fail");
        let len = count + 1 /* key type byte */;
        VarInt::with(len)
    }

    pub fn value_len(&self) -> VarInt
    where V: Encode {
        let mut sink = Sink::default();
        let len = self.value_data.encode(&mut sink).expect("sink write doesn't fail");
        VarInt::with(len)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_type_roundtrip() {
        for key in InputKey::STANDARD {
            assert_eq!(InputKey::from_u8(key.to_u8()), *key);
        }
        for key in OutputKey::STANDARD {
            assert_eq!(OutputKey::from_u8(key.to_u8()), *key);
        }
        for key in GlobalKey::STANDARD {
            assert_eq!(GlobalKey::from_u8(key.to_u8()), *key);
        }
    }

    #[test]
    fn unknown_keys() {
        // BIP-32 derivation and xpub keys are not interpreted
        assert_eq!(InputKey::from_u8(0x06), InputKey::Unknown(0x06));
        assert_eq!(OutputKey::from_u8(0x02), OutputKey::Unknown(0x02));
        assert_eq!(GlobalKey::from_u8(0x01), GlobalKey::Unknown(0x01));
        assert!(!InputKey::Unknown(0x06).is_standard());
        assert!(InputKey::Unknown(0x06).has_key_data());
        assert!(InputKey::PartialSig.has_key_data());
        assert!(!InputKey::WitnessScript.has_key_data());
    }
}
