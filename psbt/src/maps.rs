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

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::io::Read;

use amplify::hex::ToHex;
use indexmap::IndexMap;

use crate::keys::KeyValue;
use crate::{DecodeError, KeyType, PsbtError};

macro_rules! byte_data {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Wrapper, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
        #[wrapper(Deref, AsSlice, BorrowSlice)]
        pub struct $name(
            #[from]
            #[from(&[u8])]
            Vec<u8>,
        );

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0.to_hex()) }
        }
    };
}

byte_data!(KeyData, "Key data following the key type byte in a PSBT key.");
byte_data!(ValueData, "Raw value of a PSBT key-value pair.");

/// Key-value pairs of key types not interpreted by this library, grouped by the key type.
pub type UnknownMap = IndexMap<u8, IndexMap<KeyData, ValueData>>;

/// Location of a map inside PSBT, used in error reporting.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum MapName {
    #[display("global")]
    Global,

    #[display("input #{0}")]
    Input(usize),

    #[display("output #{0}")]
    Output(usize),
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Map<K: KeyType> {
    pub name: MapName,
    pub singular: BTreeMap<K, ValueData>,
    pub plural: BTreeMap<K, IndexMap<KeyData, ValueData>>,
    pub unknown: UnknownMap,
}

impl<K: KeyType> Map<K> {
    fn new(name: MapName) -> Self {
        Map {
            name,
            singular: empty!(),
            plural: empty!(),
            unknown: empty!(),
        }
    }

    /// Reads key-value pairs up to and including the map separator.
    pub fn parse(name: MapName, stream: &mut impl Read) -> Result<Self, DecodeError> {
        let mut map = Map::<K>::new(name);

        while let KeyValue::<K>::Pair(pair) =
            KeyValue::<K>::read(stream, name).map_err(|err| err.located(name))?
        {
            let key_type = pair.key_type;
            if !key_type.is_standard() {
                let submap = map.unknown.entry(key_type.to_u8()).or_default();
                if submap.contains_key(&pair.key_data) {
                    return Err(PsbtError::RepeatedUnknownKey(name, key_type.to_u8()).into());
                }
                submap.insert(pair.key_data, pair.value_data);
            } else if key_type.has_key_data() {
                let submap = map.plural.entry(key_type).or_default();
                if submap.insert(pair.key_data, pair.value_data).is_some() {
                    return Err(PsbtError::RepeatedKey(name, key_type.to_u8()).into());
                }
            } else {
                if !pair.key_data.is_empty() {
                    return Err(
                        PsbtError::NonEmptyKeyData(name, key_type.to_u8(), pair.key_data).into()
                    );
                }
                if map.singular.insert(key_type, pair.value_data).is_some() {
                    return Err(PsbtError::RepeatedKey(name, key_type.to_u8()).into());
                }
            }
        }

        Ok(map)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::InputKey;

    fn parse(bytes: &[u8]) -> Result<Map<InputKey>, PsbtError> {
        Map::<InputKey>::parse(MapName::Input(1), &mut Cursor::new(bytes)).map_err(PsbtError::from)
    }

    #[test]
    fn map_name_display() {
        assert_eq!(MapName::Global.to_string(), "global");
        assert_eq!(MapName::Input(2).to_string(), "input #2");
        assert_eq!(MapName::Output(0).to_string(), "output #0");
    }

    #[test]
    fn empty_map() {
        let map = parse(&[0x00]).unwrap();
        assert!(map.singular.is_empty());
        assert!(map.plural.is_empty());
        assert!(map.unknown.is_empty());
    }

    #[test]
    fn singular_plural_unknown() {
        let map = parse(&[
            0x01, 0x03, 0x04, 0x01, 0x00, 0x00, 0x00, // sighash type
            0x03, 0x02, 0xAA, 0xBB, 0x01, 0xCC, // partial sig with garbage data
            0x02, 0x06, 0x01, 0x02, 0xDD, 0xEE, // BIP-32 derivation (unknown)
            0x00,
        ])
        .unwrap();
        assert_eq!(map.singular[&InputKey::SighashType].as_slice(), &[1, 0, 0, 0]);
        let sigs = &map.plural[&InputKey::PartialSig];
        assert_eq!(sigs[&KeyData::from(vec![0xAA, 0xBB])].as_slice(), &[0xCC]);
        assert_eq!(map.unknown[&0x06][&KeyData::from(vec![0x01])].as_slice(), &[0xDD, 0xEE]);
    }

    #[test]
    fn repeated_keys() {
        assert_eq!(
            parse(&[0x01, 0x05, 0x00, 0x01, 0x05, 0x00, 0x00]),
            Err(PsbtError::RepeatedKey(MapName::Input(1), 0x05))
        );
        assert_eq!(
            parse(&[0x02, 0x06, 0x01, 0x00, 0x02, 0x06, 0x01, 0x01, 0xFF, 0x00]),
            Err(PsbtError::RepeatedUnknownKey(MapName::Input(1), 0x06))
        );
    }

    #[test]
    fn key_data_in_singular_key() {
        assert_eq!(
            parse(&[0x02, 0x05, 0xAA, 0x00, 0x00]),
            Err(PsbtError::NonEmptyKeyData(MapName::Input(1), 0x05, KeyData::from(vec![0xAA])))
        );
    }

    #[test]
    fn truncated() {
        assert_eq!(parse(&[0x01, 0x05]), Err(PsbtError::Truncated(MapName::Input(1))));
        assert_eq!(parse(&[]), Err(PsbtError::Truncated(MapName::Input(1))));
        assert_eq!(
            parse(&[0x01, 0x05, 0x10, 0x00]),
            Err(PsbtError::LengthExceedsData {
                map: MapName::Input(1),
                expected: 16,
                available: 1
            })
        );
    }
}
