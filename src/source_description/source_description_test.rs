use super::*;

#[test]
fn test_source_description_unmarshal() {
    let tests = vec![
        (
            "nil",
            Bytes::from_static(&[]),
            SourceDescription::default(),
            Some(Error::PacketTooShort),
        ),
        (
            "no chunks",
            Bytes::from_static(&[
                // v=2, p=0, count=0, SDES, len=0
                0x80, 0xca, 0x00, 0x00,
            ]),
            SourceDescription::default(),
            None,
        ),
        (
            "single cname",
            Bytes::from_static(&[
                // v=2, p=0, count=1, SDES, len=3
                0x81, 0xca, 0x00, 0x03, // ssrc=0x10000000
                0x10, 0x00, 0x00, 0x00, // CNAME, len=3, text=abc
                0x01, 0x03, 0x61, 0x62, 0x63, // END + padding
                0x00, 0x00, 0x00,
            ]),
            SourceDescription::with_cname(0x10000000, Bytes::from_static(b"abc")),
            None,
        ),
        (
            "two chunks",
            Bytes::from_static(&[
                // v=2, p=0, count=2, SDES, len=5
                0x82, 0xca, 0x00, 0x05, // ssrc=0x01020304
                0x01, 0x02, 0x03, 0x04, // CNAME, len=1, text=a
                0x01, 0x01, 0x61, // NOTE, len=2, text=bb
                0x07, 0x02, 0x62, 0x62, // END, already aligned
                0x00, // ssrc=0x05060708
                0x05, 0x06, 0x07, 0x08, // END + padding
                0x00, 0x00, 0x00, 0x00,
            ]),
            SourceDescription {
                chunks: vec![
                    SourceDescriptionChunk {
                        source: 0x01020304,
                        items: vec![
                            SourceDescriptionItem {
                                sdes_type: SdesType::SdesCname,
                                text: Bytes::from_static(b"a"),
                            },
                            SourceDescriptionItem {
                                sdes_type: SdesType::SdesNote,
                                text: Bytes::from_static(b"bb"),
                            },
                        ],
                    },
                    SourceDescriptionChunk {
                        source: 0x05060708,
                        items: vec![],
                    },
                ],
            },
            None,
        ),
        (
            "unknown item type is skipped",
            Bytes::from_static(&[
                // v=2, p=0, count=1, SDES, len=2
                0x81, 0xca, 0x00, 0x02, // ssrc=0x10000000
                0x10, 0x00, 0x00, 0x00, // type=99, len=1, text=x, END
                0x63, 0x01, 0x78, 0x00,
            ]),
            SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: 0x10000000,
                    items: vec![],
                }],
            },
            None,
        ),
        (
            "wrong type",
            Bytes::from_static(&[
                // v=2, p=0, count=1, BYE, len=3
                0x81, 0xcb, 0x00, 0x03, 0x10, 0x00, 0x00, 0x00, 0x01, 0x03, 0x61, 0x62, 0x63,
                0x00, 0x00, 0x00,
            ]),
            SourceDescription::default(),
            Some(Error::WrongType),
        ),
        (
            "missing terminator",
            Bytes::from_static(&[
                // v=2, p=0, count=1, SDES, len=2
                0x81, 0xca, 0x00, 0x02, // ssrc=0x10000000
                0x10, 0x00, 0x00, 0x00, // CNAME, len=2, text=ab
                0x01, 0x02, 0x61, 0x62,
            ]),
            SourceDescription::default(),
            Some(Error::PacketTooShort),
        ),
        (
            "item overruns chunk",
            Bytes::from_static(&[
                // v=2, p=0, count=1, SDES, len=2
                0x81, 0xca, 0x00, 0x02, // ssrc=0x10000000
                0x10, 0x00, 0x00, 0x00, // CNAME, len=9, text=ab
                0x01, 0x09, 0x61, 0x62,
            ]),
            SourceDescription::default(),
            Some(Error::PacketTooShort),
        ),
        (
            "trailing data after chunks",
            Bytes::from_static(&[
                // v=2, p=0, count=1, SDES, len=3
                0x81, 0xca, 0x00, 0x03, // ssrc=0x10000000
                0x10, 0x00, 0x00, 0x00, // CNAME, len=1, text=a, END
                0x01, 0x01, 0x61, 0x00, // garbage
                0xde, 0xad, 0xbe, 0xef,
            ]),
            SourceDescription::default(),
            Some(Error::InvalidHeader),
        ),
    ];

    for (name, data, want, want_error) in tests {
        let buf = &mut data.clone();
        let got = SourceDescription::unmarshal(buf);

        assert_eq!(
            got.is_err(),
            want_error.is_some(),
            "Unmarshal {name}: err = {got:?}, want {want_error:?}"
        );

        if let Some(err) = want_error {
            let got_err = got.err().unwrap();
            assert_eq!(
                err, got_err,
                "Unmarshal {name}: err = {got_err:?}, want {err:?}",
            );
        } else {
            let actual = got.unwrap();
            assert_eq!(
                actual, want,
                "Unmarshal {name}: got {actual:?}, want {want:?}"
            );
        }
    }
}

#[test]
fn test_source_description_roundtrip() {
    let mut too_long_text = vec![];
    too_long_text.resize(1 << 8, 0x61);

    let mut too_many_chunks = vec![];
    for i in 0..(1 << 5) {
        too_many_chunks.push(SourceDescriptionChunk {
            source: i,
            items: vec![SourceDescriptionItem {
                sdes_type: SdesType::SdesCname,
                text: Bytes::from_static(b"x"),
            }],
        });
    }

    let tests = vec![
        (
            "valid",
            SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: 1,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesCname,
                        text: Bytes::from_static(b"test@example.com"),
                    }],
                }],
            },
            None,
        ),
        (
            "aligned item list",
            SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: 2,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesTool,
                        text: Bytes::from_static(b"ab"),
                    }],
                }],
            },
            None,
        ),
        (
            "empty text",
            SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: 3,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesName,
                        text: Bytes::new(),
                    }],
                }],
            },
            None,
        ),
        (
            "missing type",
            SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: 1,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesEnd,
                        text: Bytes::new(),
                    }],
                }],
            },
            Some(Error::SdesMissingType),
        ),
        (
            "text too long",
            SourceDescription {
                chunks: vec![SourceDescriptionChunk {
                    source: 1,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesCname,
                        text: Bytes::from(too_long_text),
                    }],
                }],
            },
            Some(Error::SdesTextTooLong),
        ),
        (
            "count overflow",
            SourceDescription {
                chunks: too_many_chunks,
            },
            Some(Error::TooManyChunks),
        ),
    ];

    for (name, want, want_error) in tests {
        let got = want.marshal();

        assert_eq!(
            got.is_ok(),
            want_error.is_none(),
            "Marshal {name}: err = {got:?}, want {want_error:?}"
        );

        if let Some(err) = want_error {
            let got_err = got.err().unwrap();
            assert_eq!(
                err, got_err,
                "Marshal {name}: err = {got_err:?}, want {err:?}",
            );
        } else {
            let data = got.ok().unwrap();
            assert_eq!(data.len() % 4, 0, "{name} is not 32-bit aligned");

            let buf = &mut data.clone();
            let actual = SourceDescription::unmarshal(buf)
                .unwrap_or_else(|_| panic!("Unmarshal {name}"));

            assert_eq!(
                actual, want,
                "Invalid roundtrip {name}: got {actual:?}, want {want:?}"
            );
        }
    }
}

#[test]
fn test_source_description_cname() {
    let sdes = SourceDescription::with_cname(0xabcd, Bytes::from_static(b"user@host"));
    assert_eq!(sdes.cname(0xabcd), Some(&Bytes::from_static(b"user@host")));
    assert_eq!(sdes.cname(0x1234), None);
    assert_eq!(sdes.destination_ssrc(), vec![0xabcd]);
}
