// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// End-to-end codec scenarios over the public API: bit packing, interned-id
// growth, schema negotiation across diverging registrations, delta
// encoding, and shared-object identity.

use bitdelta::bitio::{BitReader, BitWriter};
use bitdelta::{registry, Decoder, Encoder, GenericsMode, MetadataType, SharedObject, Value};

#[test]
fn bit_packing_is_lsb_first() {
    // Four booleans pack into exactly one byte, 0b0000_1101.
    let mut writer = BitWriter::new();
    writer.write_bool(true);
    writer.write_bool(false);
    writer.write_bool(true);
    writer.write_bool(true);
    let bytes = writer.into_bytes();
    assert_eq!(bytes, vec![0x0D]);

    let mut reader = BitReader::from_bytes(bytes);
    assert!(reader.read_bool().unwrap());
    assert!(!reader.read_bool().unwrap());
    assert!(reader.read_bool().unwrap());
    assert!(reader.read_bool().unwrap());
}

#[test]
fn interned_id_markers_grow_logarithmically() {
    // Four fresh script strings: the new-value markers cost 1, 2, 2, 3
    // bits, and each one-byte string body costs 40 bits, so the whole
    // sequence is exactly 21 bytes.
    let mut encoder = Encoder::new(MetadataType::Full);
    encoder.write_script_string(Some("a"));
    encoder.write_script_string(Some("b"));
    encoder.write_script_string(Some("c"));
    encoder.write_script_string(Some("d"));
    encoder.flush();
    let bytes = encoder.take_bytes();
    assert_eq!(bytes.len(), 21);

    let mut decoder = Decoder::new(MetadataType::Full, GenericsMode::None);
    decoder.feed(&bytes);
    for expected in ["a", "b", "c", "d"] {
        assert_eq!(
            decoder.read_script_string().unwrap().as_deref(),
            Some(expected)
        );
    }
}

#[test]
fn enum_remap_across_registrations() {
    // The peer's Color is {RED=0, GREEN=1, BLUE=2}; ours is
    // {RED=0, BLUE=1, GREEN=2}. Under Full metadata a peer-encoded GREEN
    // decodes to our GREEN; under Hash metadata the digests differ and the
    // unmapped value decodes to zero.
    let peer = registry::register_enum_streamer(
        "codec::ColorPeer",
        vec![("RED".into(), 0), ("GREEN".into(), 1), ("BLUE".into(), 2)],
    );
    let local = registry::register_enum_streamer(
        "codec::ColorLocal",
        vec![("RED".into(), 0), ("BLUE".into(), 1), ("GREEN".into(), 2)],
    );

    let mut encoder = Encoder::new(MetadataType::Full);
    encoder.write(&Value::enumerator(&peer, 1)).unwrap();
    encoder.flush();
    let mut decoder = Decoder::new(MetadataType::Full, GenericsMode::None);
    decoder.add_type_substitution("codec::ColorPeer", &local);
    decoder.feed(&encoder.take_bytes());
    let decoded = decoder.read().unwrap();
    assert_eq!(decoded.as_enum().unwrap().value, 2);

    let mut encoder = Encoder::new(MetadataType::Hash);
    encoder.write(&Value::enumerator(&peer, 1)).unwrap();
    encoder.flush();
    let mut decoder = Decoder::new(MetadataType::Hash, GenericsMode::None);
    decoder.add_type_substitution("codec::ColorPeer", &local);
    decoder.feed(&encoder.take_bytes());
    let decoded = decoder.read().unwrap();
    assert_eq!(decoded.as_enum().unwrap().value, 0);
}

#[test]
fn list_delta_reconstructs_value() {
    let list = registry::register_list_streamer("codec::IntList", registry::i32_streamer());
    let reference = Value::list(&list, vec![1i32.into(), 2i32.into(), 3i32.into()]);
    let value = Value::list(
        &list,
        vec![1i32.into(), 9i32.into(), 3i32.into(), 4i32.into()],
    );

    let mut encoder = Encoder::new(MetadataType::Full);
    encoder.write_typed_delta(&list, &value, &reference).unwrap();
    encoder.flush();

    let mut decoder = Decoder::new(MetadataType::Full, GenericsMode::None);
    decoder.feed(&encoder.take_bytes());
    assert_eq!(decoder.read_typed_delta(&list, &reference).unwrap(), value);
}

#[test]
fn set_delta_toggles_membership() {
    let set = registry::register_set_streamer("codec::NameSet", registry::string_streamer());
    let reference = Value::set(&set, vec!["a".into(), "b".into(), "c".into()]);
    let value = Value::set(&set, vec!["a".into(), "c".into(), "d".into()]);

    let mut encoder = Encoder::new(MetadataType::Full);
    encoder.write_typed_delta(&set, &value, &reference).unwrap();
    encoder.flush();

    let mut decoder = Decoder::new(MetadataType::Full, GenericsMode::None);
    decoder.feed(&encoder.take_bytes());
    assert_eq!(decoder.read_typed_delta(&set, &reference).unwrap(), value);
}

#[test]
fn equal_values_delta_in_one_bit() {
    let point = registry::register_record_streamer(
        "codec::Point",
        vec![
            ("x".into(), registry::i32_streamer()),
            ("y".into(), registry::i32_streamer()),
        ],
    );
    let value = Value::record(&point, vec![10i32.into(), 20i32.into()]);

    let mut encoder = Encoder::new(MetadataType::Full);
    encoder.write_typed_delta(&point, &value, &value).unwrap();
    encoder.flush();
    assert_eq!(encoder.take_bytes(), vec![0x00]);
}

#[test]
fn roundtrip_identity_for_composite_values() {
    let point = registry::register_record_streamer(
        "codec::Point",
        vec![
            ("x".into(), registry::i32_streamer()),
            ("y".into(), registry::i32_streamer()),
        ],
    );
    let shape = registry::register_record_streamer(
        "codec::Shape",
        vec![
            ("origin".into(), point.clone()),
            ("label".into(), registry::string_streamer()),
            ("opacity".into(), registry::f32_streamer()),
        ],
    );
    let value = Value::record(
        &shape,
        vec![
            Value::record(&point, vec![(-3i32).into(), 8i32.into()]),
            "circle".into(),
            0.75f32.into(),
        ],
    );

    for metadata in [MetadataType::None, MetadataType::Hash, MetadataType::Full] {
        let mut encoder = Encoder::new(metadata);
        encoder.write(&value).unwrap();
        encoder.flush();
        let mut decoder = Decoder::new(metadata, GenericsMode::None);
        decoder.feed(&encoder.take_bytes());
        assert_eq!(decoder.read().unwrap(), value, "{:?}", metadata);
    }
}

#[test]
fn delta_identity_for_arbitrary_pairs() {
    let map = registry::register_map_streamer(
        "codec::Prices",
        registry::string_streamer(),
        registry::i32_streamer(),
    );
    let reference = Value::map(
        &map,
        vec![("ore".into(), 10i32.into()), ("gas".into(), 20i32.into())],
    );
    let value = Value::map(
        &map,
        vec![("ore".into(), 12i32.into()), ("crystal".into(), 99i32.into())],
    );

    let mut encoder = Encoder::new(MetadataType::Full);
    encoder.write_typed_delta(&map, &value, &reference).unwrap();
    encoder.write_typed_delta(&map, &reference, &reference).unwrap();
    encoder.flush();

    let mut decoder = Decoder::new(MetadataType::Full, GenericsMode::None);
    decoder.feed(&encoder.take_bytes());
    assert_eq!(decoder.read_typed_delta(&map, &reference).unwrap(), value);
    assert_eq!(
        decoder.read_typed_delta(&map, &reference).unwrap(),
        reference
    );
}

#[test]
fn shared_object_successor_travels_as_delta() {
    let class = registry::register_class(
        "codec::Avatar",
        vec![
            ("name".into(), registry::string_streamer()),
            ("score".into(), registry::i32_streamer()),
        ],
    );
    let original = SharedObject::new(&class);
    original.set_property("name", "alice".into());
    original.set_property("score", 1i32.into());

    let mut encoder = Encoder::new(MetadataType::Full);
    let mut decoder = Decoder::new(MetadataType::Full, GenericsMode::None);

    encoder.write_shared(Some(&original)).unwrap();
    encoder.flush();
    let first = encoder.take_bytes();
    encoder.persist_and_reset_write_mappings();

    decoder.feed(&first);
    let received = decoder.read_shared().unwrap().expect("first transmission");
    assert_eq!(received.remote_id(), original.id());
    assert_eq!(received.remote_origin_id(), original.origin_id());
    decoder.reset();
    decoder.persist_and_reset_read_mappings();

    let successor = original.successor();
    successor.set_property("score", 2i32.into());
    encoder.write_shared(Some(&successor)).unwrap();
    encoder.flush();
    let second = encoder.take_bytes();
    assert!(second.len() < first.len());

    decoder.feed(&second);
    let updated = decoder.read_shared().unwrap().expect("successor");
    assert_eq!(updated.property("score"), Some(2i32.into()));
    assert_eq!(updated.property("name"), Some("alice".into()));
    assert_eq!(updated.remote_origin_id(), original.origin_id());
    assert_eq!(updated.origin_id(), received.origin_id());
}

#[test]
fn cursor_state_matches_after_paired_operations() {
    let mut writer = BitWriter::new();
    writer.write_bool(true);
    writer.write_u32_bits(0b10110, 5);
    writer.write_i32(-1);
    writer.write_bool(false);
    let (wbyte, wposition) = writer.cursor();

    let mut reader = BitReader::from_bytes(writer.into_bytes());
    reader.read_bool().unwrap();
    reader.read_u32_bits(5).unwrap();
    reader.read_i32().unwrap();
    reader.read_bool().unwrap();
    let (rbyte, rposition) = reader.cursor();

    assert_eq!(wposition, rposition);
    let mask = (1u16 << wposition) - 1;
    assert_eq!(u16::from(wbyte) & mask, u16::from(rbyte) & mask);
}

#[test]
fn unknown_peer_schema_keeps_stream_aligned() {
    // The local registry resolves the peer's name to a narrower record;
    // known fields land, the unknown one is consumed, and everything after
    // it still decodes.
    let peer = registry::register_record_streamer(
        "codec::TelemetryPeer",
        vec![
            ("sequence".into(), registry::u32_streamer()),
            ("debug_note".into(), registry::string_streamer()),
            ("level".into(), registry::f64_streamer()),
        ],
    );
    let local = registry::register_record_streamer(
        "codec::TelemetryLocal",
        vec![
            ("sequence".into(), registry::u32_streamer()),
            ("level".into(), registry::f64_streamer()),
        ],
    );

    let mut encoder = Encoder::new(MetadataType::Full);
    encoder
        .write(&Value::record(
            &peer,
            vec![7u32.into(), "internal".into(), 0.5f64.into()],
        ))
        .unwrap();
    encoder.write_string("trailer");
    encoder.flush();

    let mut decoder = Decoder::new(MetadataType::Full, GenericsMode::None);
    decoder.add_type_substitution("codec::TelemetryPeer", &local);
    decoder.feed(&encoder.take_bytes());
    let decoded = decoder.read().unwrap();
    let record = decoded.as_record().expect("record");
    assert_eq!(record.fields, vec![7u32.into(), 0.5f64.into()]);
    assert_eq!(decoder.read_string().unwrap(), "trailer");
}
