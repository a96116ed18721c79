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

use std::io::{self, Cursor, Read, Write};

use amplify::{confinement, IoError, Wrapper};
use bc::secp256k1::{ecdsa, PublicKey};
use bc::{
    ConsensusDataError, ConsensusDecode, ConsensusDecodeError, ConsensusEncode, LegacyPk,
    LegacySig, LockTime, RedeemScript, ScriptBytes, SigScript, SighashFlag, SighashType, Tx, TxIn,
    TxOut, TxVer, Txid, VarInt, Vout, Witness, WitnessScript,
};

use crate::keys::KeyValue;
use crate::maps::UnknownMap;
use crate::{
    GlobalKey, Input, InputKey, KeyData, KeyPair, KeyType, Map, MapName, Output, OutputKey, Psbt,
    UnsignedTx, UnsignedTxIn, ValueData,
};

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(inner)]
pub enum DecodeError {
    #[from]
    #[from(io::Error)]
    Io(IoError),

    #[from]
    #[from(ConsensusDataError)]
    #[from(confinement::Error)]
    Psbt(PsbtError),
}

impl From<ConsensusDecodeError> for DecodeError {
    fn from(e: ConsensusDecodeError) -> Self {
        match e {
            ConsensusDecodeError::Io(e) => DecodeError::Io(e),
            ConsensusDecodeError::Data(data) => data.into(),
        }
    }
}

impl DecodeError {
    /// Attributes end-of-data errors to the map which was being read.
    pub(crate) fn located(self, map: MapName) -> Self {
        match self {
            DecodeError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                PsbtError::Truncated(map).into()
            }
            err => err,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum PsbtError {
    /// unexpected end of data.
    UnexpectedEod,

    /// PSBT data are followed by some excessive bytes.
    DataNotConsumed,

    /// invalid magic bytes {0:02x?}.
    InvalidMagic([u8; 5]),

    /// {0} map is truncated or absent; PSBT must contain one map per transaction input and
    /// output.
    Truncated(MapName),

    /// {map} map declares {expected} bytes of data, but only {available} bytes remain.
    LengthExceedsData {
        map: MapName,
        expected: usize,
        available: usize,
    },

    /// repeated key {1:#04x} in {0} map.
    RepeatedKey(MapName, u8),

    /// repeated unknown key {1:#04x} in {0} map.
    RepeatedUnknownKey(MapName, u8),

    /// key {1:#04x} in {0} map must not contain additional key data {2}.
    NonEmptyKeyData(MapName, u8, KeyData),

    /// PSBT version {0} is not supported.
    UnsupportedVersion(u32),

    /// global map doesn't contain unsigned transaction.
    NoUnsignedTx,

    /// unsigned transaction input #{0} has a non-empty scriptSig.
    SignedTx(usize),

    /// invalid value for key {key:#04x} in {map} map.
    InvalidValue { map: MapName, key: u8 },

    /// invalid public key in {0} map.
    InvalidPubkey(MapName),

    /// invalid signature in {0} map.
    InvalidSig(MapName),

    /// invalid sighash type {1:#010x} in {0} map.
    InvalidSighash(MapName, u32),

    /// non-witness UTXO of input #{index} is transaction {found}, while the input spends an
    /// output of {expected}.
    NonWitnessTxMismatch {
        index: usize,
        expected: Txid,
        found: Txid,
    },

    /// non-witness UTXO of input #{index} has no output #{vout}.
    NonWitnessTxNoOutput { index: usize, vout: Vout },

    /// witness UTXO of input #{0} differs from the spent output of its non-witness transaction.
    WitnessUtxoMismatch(usize),

    /// data exceed the size limits of a bitcoin transaction or script.
    #[from]
    Confinement(confinement::Error),

    #[from]
    #[display(inner)]
    Consensus(ConsensusDataError),
}

impl From<DecodeError> for PsbtError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Psbt(e) => e,
            DecodeError::Io(_) => PsbtError::UnexpectedEod,
        }
    }
}

pub trait Encode {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError>;
}

impl<'a, T: Encode> Encode for &'a T {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> { (*self).encode(writer) }
}

pub trait Decode
where Self: Sized
{
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError>;
    fn deserialize(bytes: impl AsRef<[u8]>) -> Result<Self, PsbtError> {
        let bytes = bytes.as_ref();
        let mut cursor = Cursor::new(bytes);
        let me = Self::decode(&mut cursor)?;
        if cursor.position() != bytes.len() as u64 {
            return Err(PsbtError::DataNotConsumed);
        }
        Ok(me)
    }
}

fn decode_value<T: Decode>(
    map: MapName,
    key_type: impl KeyType,
    value: &ValueData,
) -> Result<T, PsbtError> {
    T::deserialize(value).map_err(|_| PsbtError::InvalidValue {
        map,
        key: key_type.to_u8(),
    })
}

fn encode_unknown<T: KeyType>(
    unknown: &UnknownMap,
    writer: &mut impl Write,
) -> Result<usize, IoError> {
    let mut counter = 0;
    for (key_type, submap) in unknown {
        for (key_data, value_data) in submap {
            counter += KeyPair::new(T::from_u8(*key_type), key_data, value_data).encode(writer)?;
        }
    }
    Ok(counter)
}

impl Psbt {
    const MAGIC: [u8; 5] = *b"psbt\xFF";
    pub(crate) const SEPARATOR: [u8; 1] = [0x0];

    pub fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = Self::MAGIC.len();
        writer.write_all(&Self::MAGIC)?;

        counter += self.encode_global(writer)? + Self::SEPARATOR.len();
        writer.write_all(&Self::SEPARATOR)?;

        for input in &self.inputs {
            counter += input.encode(writer)?;
        }

        for output in &self.outputs {
            counter += output.encode(writer)?;
        }

        Ok(counter)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut vec = Vec::new();
        self.encode(&mut vec).expect("in-memory encoding can't error");
        vec
    }

    fn encode_global(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;

        counter +=
            KeyPair::new(GlobalKey::UnsignedTx, (), self.to_unsigned_tx()).encode(writer)?;

        counter += encode_unknown::<GlobalKey>(&self.unknown, writer)?;

        Ok(counter)
    }

    pub fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let mut magic = Self::MAGIC;
        reader.read_exact(&mut magic)?;
        if magic != Self::MAGIC {
            return Err(PsbtError::InvalidMagic(magic).into());
        }

        let map = Map::<GlobalKey>::parse(MapName::Global, reader)?;
        let mut psbt = Psbt::from_global_map(map)?;

        for input in &mut psbt.inputs {
            let map = Map::<InputKey>::parse(MapName::Input(input.index), reader)?;
            input.populate(map)?;
        }

        for output in &mut psbt.outputs {
            let map = Map::<OutputKey>::parse(MapName::Output(output.index), reader)?;
            output.populate(map)?;
        }

        Ok(psbt)
    }

    /// Decodes PSBT from its binary serialization; all the data must be consumed.
    pub fn deserialize(data: impl AsRef<[u8]>) -> Result<Self, PsbtError> {
        let data = data.as_ref();
        let mut cursor = Cursor::new(data);
        let psbt = Self::decode(&mut cursor)?;
        if cursor.position() != data.len() as u64 {
            return Err(PsbtError::DataNotConsumed);
        }
        Ok(psbt)
    }

    fn from_global_map(map: Map<GlobalKey>) -> Result<Self, PsbtError> {
        if let Some(value) = map.singular.get(&GlobalKey::Version) {
            let version: u32 = decode_value(map.name, GlobalKey::Version, value)?;
            if version != 0 {
                return Err(PsbtError::UnsupportedVersion(version));
            }
        }

        let value = map.singular.get(&GlobalKey::UnsignedTx).ok_or(PsbtError::NoUnsignedTx)?;
        let unsigned_tx = UnsignedTx::deserialize(value).map_err(|err| match err {
            err @ PsbtError::SignedTx(_) => err,
            _ => PsbtError::InvalidValue {
                map: map.name,
                key: GlobalKey::UnsignedTx.to_u8(),
            },
        })?;

        let mut psbt = Psbt::from_unsigned_tx(unsigned_tx);
        psbt.unknown = map.unknown;
        Ok(psbt)
    }
}

impl Input {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;

        if let Some(tx) = &self.non_witness_tx {
            counter += KeyPair::new(InputKey::NonWitnessUtxo, (), tx).encode(writer)?;
        }

        if let Some(txout) = &self.witness_utxo {
            counter += KeyPair::new(InputKey::WitnessUtxo, (), txout).encode(writer)?;
        }

        for (pk, sig) in &self.partial_sigs {
            counter += KeyPair::new(InputKey::PartialSig, pk, sig).encode(writer)?;
        }

        if let Some(sighash_type) = self.sighash_type {
            counter += KeyPair::new(InputKey::SighashType, (), sighash_type).encode(writer)?;
        }

        if let Some(script) = &self.redeem_script {
            counter += KeyPair::new(InputKey::RedeemScript, (), script).encode(writer)?;
        }

        if let Some(script) = &self.witness_script {
            counter += KeyPair::new(InputKey::WitnessScript, (), script).encode(writer)?;
        }

        if let Some(script) = &self.final_script_sig {
            counter += KeyPair::new(InputKey::FinalScriptSig, (), script).encode(writer)?;
        }

        if let Some(witness) = &self.final_witness {
            counter += KeyPair::new(InputKey::FinalWitness, (), witness).encode(writer)?;
        }

        counter += encode_unknown::<InputKey>(&self.unknown, writer)?;

        counter += Psbt::SEPARATOR.len();
        writer.write_all(&Psbt::SEPARATOR)?;

        Ok(counter)
    }

    fn populate(&mut self, map: Map<InputKey>) -> Result<(), PsbtError> {
        let name = map.name;

        for (key_type, value) in &map.singular {
            match key_type {
                InputKey::NonWitnessUtxo => {
                    let tx: Tx = decode_value(name, *key_type, value)?;
                    let found = tx.txid();
                    let expected = self.previous_outpoint.txid;
                    if found != expected {
                        return Err(PsbtError::NonWitnessTxMismatch {
                            index: self.index,
                            expected,
                            found,
                        });
                    }
                    let vout = self.previous_outpoint.vout;
                    if vout.to_usize() >= tx.outputs.len() {
                        return Err(PsbtError::NonWitnessTxNoOutput {
                            index: self.index,
                            vout,
                        });
                    }
                    self.non_witness_tx = Some(tx);
                }
                InputKey::WitnessUtxo => {
                    self.witness_utxo = Some(decode_value(name, *key_type, value)?);
                }
                InputKey::SighashType => {
                    let val: u32 = decode_value(name, *key_type, value)?;
                    let sighash_type =
                        sighash_from_u32(val).ok_or(PsbtError::InvalidSighash(name, val))?;
                    self.sighash_type = Some(sighash_type);
                }
                InputKey::RedeemScript => {
                    self.redeem_script = Some(decode_value(name, *key_type, value)?);
                }
                InputKey::WitnessScript => {
                    self.witness_script = Some(decode_value(name, *key_type, value)?);
                }
                InputKey::FinalScriptSig => {
                    self.final_script_sig = Some(decode_value(name, *key_type, value)?);
                }
                InputKey::FinalWitness => {
                    self.final_witness = Some(decode_value(name, *key_type, value)?);
                }
                // keys with key data never get into the singular map
                InputKey::PartialSig | InputKey::Unknown(_) => {}
            }
        }

        if let Some(sigs) = map.plural.get(&InputKey::PartialSig) {
            for (key_data, value) in sigs {
                let pk = pk_from_slice(key_data).ok_or(PsbtError::InvalidPubkey(name))?;
                let sig = sig_from_slice(value).ok_or(PsbtError::InvalidSig(name))?;
                self.partial_sigs.insert(pk, sig);
            }
        }

        if let (Some(tx), Some(utxo)) = (&self.non_witness_tx, &self.witness_utxo) {
            if tx.outputs.get(self.previous_outpoint.vout.to_usize()) != Some(utxo) {
                return Err(PsbtError::WitnessUtxoMismatch(self.index));
            }
        }

        self.unknown = map.unknown;
        Ok(())
    }
}

impl Output {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;

        if let Some(script) = &self.redeem_script {
            counter += KeyPair::new(OutputKey::RedeemScript, (), script).encode(writer)?;
        }

        if let Some(script) = &self.witness_script {
            counter += KeyPair::new(OutputKey::WitnessScript, (), script).encode(writer)?;
        }

        counter += encode_unknown::<OutputKey>(&self.unknown, writer)?;

        counter += Psbt::SEPARATOR.len();
        writer.write_all(&Psbt::SEPARATOR)?;

        Ok(counter)
    }

    fn populate(&mut self, map: Map<OutputKey>) -> Result<(), PsbtError> {
        let name = map.name;

        for (key_type, value) in &map.singular {
            match key_type {
                OutputKey::RedeemScript => {
                    self.redeem_script = Some(decode_value(name, *key_type, value)?);
                }
                OutputKey::WitnessScript => {
                    self.witness_script = Some(decode_value(name, *key_type, value)?);
                }
                OutputKey::Unknown(_) => {}
            }
        }

        self.unknown = map.unknown;
        Ok(())
    }
}

impl<T: KeyType, K: Encode, V: Encode> Encode for KeyPair<T, K, V> {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;

        counter += self.key_len().encode(writer)?;
        counter += self.key_type.to_u8().encode(writer)?;
        counter += self.key_data.encode(writer)?;

        counter += self.value_len().encode(writer)?;
        counter += self.value_data.encode(writer)?;

        Ok(counter)
    }
}

impl<T: KeyType> KeyValue<T> {
    /// Reads a key-value pair or the map separator. Lengths are checked against the data
    /// actually present before anything gets allocated for them.
    pub(crate) fn read(reader: &mut impl Read, map: MapName) -> Result<Self, DecodeError> {
        let key_len = VarInt::consensus_decode(reader)?.to_usize();
        if key_len == 0 {
            return Ok(KeyValue::Separator);
        }

        let key_type = T::from_u8(u8::consensus_decode(reader)?);
        let key_data = read_exact_len(reader, key_len - 1, map)?;
        let value_len = VarInt::consensus_decode(reader)?.to_usize();
        let value_data = read_exact_len(reader, value_len, map)?;

        Ok(KeyValue::Pair(KeyPair {
            key_type,
            key_data: KeyData::from(key_data),
            value_data: ValueData::from(value_data),
        }))
    }
}

fn read_exact_len(
    reader: &mut impl Read,
    len: usize,
    map: MapName,
) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::new();
    reader.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(PsbtError::LengthExceedsData {
            map,
            expected: len,
            available: buf.len(),
        }
        .into());
    }
    Ok(buf)
}

impl Encode for UnsignedTx {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = self.version.consensus_encode(writer)?;
        counter += VarInt::with(self.inputs.len()).consensus_encode(writer)?;
        for input in &self.inputs {
            counter += input.prev_output.consensus_encode(writer)?;
            counter += SigScript::new().consensus_encode(writer)?;
            counter += input.sequence.consensus_encode(writer)?;
        }
        counter += VarInt::with(self.outputs.len()).consensus_encode(writer)?;
        for output in &self.outputs {
            counter += output.consensus_encode(writer)?;
        }
        counter += self.lock_time.consensus_encode(writer)?;
        Ok(counter)
    }
}

impl Decode for UnsignedTx {
    /// Always reads the non-witness serialization, which allows transactions with zero inputs.
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let version = TxVer::consensus_decode(reader)?;
        let input_count = VarInt::consensus_decode(reader)?.to_usize();
        let mut inputs = Vec::new();
        for no in 0..input_count {
            let input = TxIn::consensus_decode(reader)?;
            if !input.sig_script.is_empty() {
                return Err(PsbtError::SignedTx(no).into());
            }
            inputs.push(UnsignedTxIn {
                prev_output: input.prev_output,
                sequence: input.sequence,
            });
        }
        let output_count = VarInt::consensus_decode(reader)?.to_usize();
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            outputs.push(TxOut::consensus_decode(reader)?);
        }
        let lock_time = LockTime::consensus_decode(reader)?;
        Ok(UnsignedTx {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }
}

fn pk_from_slice(bytes: &[u8]) -> Option<LegacyPk> {
    let pubkey = PublicKey::from_slice(bytes).ok()?;
    Some(LegacyPk {
        compressed: bytes.len() == 33,
        pubkey,
    })
}

fn sig_from_slice(bytes: &[u8]) -> Option<LegacySig> {
    let (sighash, sig) = bytes.split_last()?;
    Some(LegacySig {
        sig: ecdsa::Signature::from_der(sig).ok()?,
        sighash_type: sighash_from_u32(*sighash as u32)?,
    })
}

/// Accepts only the standard sighash types: `ALL`, `NONE` and `SINGLE`, optionally with the
/// `ANYONECANPAY` flag.
pub(crate) fn sighash_from_u32(value: u32) -> Option<SighashType> {
    let flag = match value & 0x7F {
        0x01 => SighashFlag::All,
        0x02 => SighashFlag::None,
        0x03 => SighashFlag::Single,
        _ => return None,
    };
    if value & !0xFF != 0 {
        return None;
    }
    Some(SighashType {
        flag,
        anyone_can_pay: value & 0x80 != 0,
    })
}

pub(crate) fn sighash_to_u8(sighash_type: SighashType) -> u8 {
    let flag = match sighash_type.flag {
        SighashFlag::All => 0x01,
        SighashFlag::None => 0x02,
        SighashFlag::Single => 0x03,
    };
    if sighash_type.anyone_can_pay {
        flag | 0x80
    } else {
        flag
    }
}

impl Encode for LegacyPk {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        if self.compressed {
            writer.write_all(&self.pubkey.serialize())?;
            Ok(33)
        } else {
            writer.write_all(&self.pubkey.serialize_uncompressed())?;
            Ok(65)
        }
    }
}

impl Encode for LegacySig {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let sig = self.sig.serialize_der();
        writer.write_all(sig.as_ref())?;
        sighash_to_u8(self.sighash_type).encode(writer)?;
        Ok(sig.len() + 1)
    }
}

impl Encode for SighashType {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        (sighash_to_u8(*self) as u32).encode(writer)
    }
}

macro_rules! psbt_code_using_consensus {
    ($ty:ty) => {
        impl Encode for $ty {
            fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
                self.consensus_encode(writer)
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
                Self::consensus_decode(reader).map_err(DecodeError::from)
            }
        }
    };
}

psbt_code_using_consensus!(Tx);
psbt_code_using_consensus!(TxOut);
psbt_code_using_consensus!(Witness);
psbt_code_using_consensus!(VarInt);
psbt_code_using_consensus!(u8);
psbt_code_using_consensus!(u32);

/// Scripts are stored in PSBT values as-is, without a length prefix.
macro_rules! psbt_code_raw_script {
    ($ty:ty) => {
        impl Encode for $ty {
            fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
                let bytes = self.as_slice();
                writer.write_all(bytes)?;
                Ok(bytes.len())
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(Self::from_inner(ScriptBytes::try_from(buf)?))
            }
        }
    };
}

psbt_code_raw_script!(RedeemScript);
psbt_code_raw_script!(WitnessScript);
psbt_code_raw_script!(SigScript);

macro_rules! psbt_encode_raw_bytes {
    ($ty:ty) => {
        impl Encode for $ty {
            fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
                writer.write_all(self.as_slice())?;
                Ok(self.len())
            }
        }
    };
}

psbt_encode_raw_bytes!(KeyData);
psbt_encode_raw_bytes!(ValueData);

impl Encode for () {
    fn encode(&self, _writer: &mut impl Write) -> Result<usize, IoError> { Ok(0) }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;
    use amplify::ByteArray;
    use bc::{Outpoint, Sats, ScriptPubkey, SeqNo, VarIntArray};

    use super::*;

    fn script<T: Wrapper<Inner = ScriptBytes>>(bytes: Vec<u8>) -> T {
        T::from_inner(ScriptBytes::try_from(bytes).unwrap())
    }

    fn unsigned_tx(inputs: usize) -> UnsignedTx {
        UnsignedTx {
            version: TxVer::V2,
            inputs: (0..inputs)
                .map(|no| UnsignedTxIn {
                    prev_output: Outpoint::new(
                        Txid::from_byte_array([0x11; 32]),
                        Vout::from_u32(no as u32),
                    ),
                    sequence: SeqNo::from_consensus_u32(u32::MAX),
                })
                .collect(),
            outputs: vec![TxOut::new(script::<ScriptPubkey>(vec![0x51]), Sats::from(95_000u64))],
            lock_time: LockTime::ZERO,
        }
    }

    #[test]
    fn unsigned_tx_zero_inputs() {
        let tx = unsigned_tx(0);
        let mut bytes = vec![];
        tx.encode(&mut bytes).unwrap();
        assert_eq!(bytes[4], 0x00);
        assert_eq!(UnsignedTx::deserialize(&bytes), Ok(tx));
    }

    #[test]
    fn unsigned_tx_with_sig_script() {
        let tx = Tx::from(unsigned_tx(2));
        let mut inputs = tx.inputs.iter().cloned().collect::<Vec<_>>();
        inputs[1].sig_script = script::<SigScript>(vec![0x51]);
        let signed = Tx {
            inputs: VarIntArray::from_iter_checked(inputs),
            ..tx
        };
        let bytes = signed.consensus_serialize();
        assert_eq!(UnsignedTx::deserialize(bytes), Err(PsbtError::SignedTx(1)));
    }

    #[test]
    fn key_pair_encoding() {
        let script = script::<WitnessScript>(vec![0x51, 0x52]);
        let mut bytes = vec![];
        let len = KeyPair::new(InputKey::WitnessScript, (), &script).encode(&mut bytes).unwrap();
        assert_eq!(len, 5);
        assert_eq!(bytes, Vec::<u8>::from_hex("0105025152").unwrap());
    }

    #[test]
    fn located_errors() {
        let err = DecodeError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert_eq!(
            err.located(MapName::Output(3)),
            DecodeError::from(PsbtError::Truncated(MapName::Output(3)))
        );
        let err = DecodeError::from(PsbtError::NoUnsignedTx);
        assert_eq!(err.located(MapName::Global), DecodeError::Psbt(PsbtError::NoUnsignedTx));
    }

    #[test]
    fn sighash_types() {
        for value in [0x01, 0x02, 0x03, 0x81, 0x82, 0x83] {
            let sighash_type = sighash_from_u32(value).unwrap();
            assert_eq!(sighash_to_u8(sighash_type) as u32, value);
        }
        assert_eq!(sighash_from_u32(0x01), Some(SighashType::all()));
        for value in [0x00, 0x04, 0x41, 0x80, 0x84, 0x101] {
            assert_eq!(sighash_from_u32(value), None);
        }
    }

    #[test]
    fn partial_sig_values() {
        assert_eq!(pk_from_slice(&[0x02; 32]), None);
        assert_eq!(sig_from_slice(&[]), None);
        assert_eq!(sig_from_slice(&[0x30, 0x00, 0x01]), None);
    }
}
