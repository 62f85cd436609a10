use std::io::Cursor;

use flac_codec::decoder::{FlacReader, Validation};
use flac_codec::encoder::FlacWriter;

#[test]
fn mono_silence_round_trips_and_its_own_md5_checks_out() {
    let samples = vec![0i32; 4096];
    let mut writer = FlacWriter::create(Cursor::new(Vec::new()), 1, 16, 44_100).unwrap();
    writer.write_block(&[samples.clone()]).unwrap();
    let cursor = writer.finish_seekable().unwrap();

    let mut reader = FlacReader::open(cursor).unwrap();
    assert_eq!(reader.streaminfo().channels, 1);
    assert_eq!(reader.streaminfo().bits_per_sample, 16);
    assert!(reader.streaminfo().md5_is_set());

    let block = reader.next_frame().unwrap().unwrap();
    assert_eq!(block.channels[0], samples);
    assert!(reader.next_frame().unwrap().is_none());
    reader.finish().unwrap();
}

#[test]
fn stereo_ramp_round_trips_through_whichever_decorrelation_wins() {
    let block_size = 256usize;
    let left: Vec<i32> = (0..block_size as i32).collect();
    let right: Vec<i32> = (0..block_size as i32).map(|i| i + 3).collect();

    let mut writer = FlacWriter::create(Cursor::new(Vec::new()), 2, 16, 48_000).unwrap();
    writer.write_block(&[left.clone(), right.clone()]).unwrap();
    let cursor = writer.finish_seekable().unwrap();

    let mut reader = FlacReader::open(cursor).unwrap();
    let block = reader.next_frame().unwrap().unwrap();
    assert_eq!(block.channels[0], left);
    assert_eq!(block.channels[1], right);
    assert!(reader.next_frame().unwrap().is_none());
    reader.finish().unwrap();
}

#[test]
fn full_stream_round_trip_checks_out_against_its_own_md5() {
    let mut writer = FlacWriter::create(Cursor::new(Vec::new()), 2, 16, 44_100).unwrap();
    for block in 0..4 {
        let left: Vec<i32> = (0..128).map(|i| (block * 7 + i) % 200 - 100).collect();
        let right: Vec<i32> = (0..128).map(|i| (block * 11 + i) % 150 - 75).collect();
        writer.write_block(&[left, right]).unwrap();
    }
    let cursor = writer.finish_seekable().unwrap();

    let mut reader = FlacReader::open(cursor).unwrap();
    assert_eq!(reader.streaminfo().samples, Some(512));
    while reader.next_frame().unwrap().is_some() {}
    reader.finish().unwrap();
}

#[test]
fn various_channel_counts_and_bit_depths_round_trip() {
    for channels in 1u8..=8 {
        for bps in [8u8, 12, 16, 20, 24] {
            let block_size = 32usize;
            let data: Vec<Vec<i32>> = (0..channels)
                .map(|c| {
                    (0..block_size)
                        .map(|i| ((i as i32 + c as i32 * 3) % 100) - 50)
                        .collect()
                })
                .collect();

            let mut writer = FlacWriter::create(Vec::new(), channels, bps, 44_100).unwrap();
            writer.write_block(&data).unwrap();
            let bytes = writer.finish().unwrap();

            let mut reader = FlacReader::open(Cursor::new(bytes)).unwrap();
            let block = reader.next_frame().unwrap().unwrap();
            assert_eq!(block.channels, data, "channels={channels} bps={bps}");
        }
    }
}

#[test]
fn id3v2_tag_ahead_of_the_stream_header_is_skipped_on_open() {
    let samples: Vec<i32> = (1..=16).collect();
    let mut writer = FlacWriter::create(Vec::new(), 1, 16, 44_100).unwrap();
    writer.write_block(&[samples.clone()]).unwrap();
    let flac_bytes = writer.finish().unwrap();

    let tag_size: u32 = 37;
    let mut prefixed = vec![b'I', b'D', b'3', 3, 0, 0];
    prefixed.push(((tag_size >> 21) & 0x7f) as u8);
    prefixed.push(((tag_size >> 14) & 0x7f) as u8);
    prefixed.push(((tag_size >> 7) & 0x7f) as u8);
    prefixed.push((tag_size & 0x7f) as u8);
    prefixed.extend(std::iter::repeat(0u8).take(tag_size as usize));
    prefixed.extend_from_slice(&flac_bytes);

    let mut reader = FlacReader::open(Cursor::new(prefixed)).unwrap();
    let block = reader.next_frame().unwrap().unwrap();
    assert_eq!(block.channels[0], samples);
}

#[test]
fn a_garbage_signature_is_rejected() {
    let bytes = b"NotAFlacStreamAtAll".to_vec();
    let err = FlacReader::open(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, flac_codec::Error::InvalidStreamHeader));
}

#[test]
fn synthesized_seek_table_lands_at_or_before_the_target_sample() {
    let mut writer = FlacWriter::create(Cursor::new(Vec::new()), 1, 16, 44_100).unwrap();
    for block in 0..20 {
        let samples: Vec<i32> = (0..64).map(|i| block * 64 + i).collect();
        writer.write_block(&[samples]).unwrap();
    }
    let cursor = writer.finish_seekable().unwrap();

    let mut reader = FlacReader::open(cursor).unwrap();
    reader.synthesize_seek_table(4).unwrap();
    assert!(reader.seek_table().is_some());

    let landed = reader.seek(900).unwrap();
    assert!(landed <= 900);

    let mut decoded = Vec::new();
    while let Some(block) = reader.next_frame().unwrap() {
        if decoded.is_empty() {
            assert_eq!(block.first_sample, landed);
        }
        decoded.extend(block.channels[0].iter().copied());
        if landed as usize + decoded.len() > 900 {
            break;
        }
    }
    let target_index = (900 - landed) as usize;
    assert_eq!(decoded[target_index], 900);
}

#[test]
fn strict_validation_rejects_an_oversized_block_at_cd_sample_rate() {
    let mut writer = FlacWriter::create(Vec::new(), 1, 16, 44_100).unwrap();
    writer.write_block(&[vec![0i32; 5000]]).unwrap();
    let bytes = writer.finish().unwrap();

    let mut lenient = FlacReader::open(Cursor::new(bytes.clone())).unwrap();
    assert!(lenient.next_frame().is_ok());

    let mut strict = FlacReader::open_with_validation(Cursor::new(bytes), Validation::Strict).unwrap();
    assert!(strict.next_frame().is_err());
}
