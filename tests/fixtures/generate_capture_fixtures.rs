//! Generates the capture fixtures used by the integration tests.
//!
//! Run with: `cargo run --bin generate_capture_fixtures`
//!
//! A 300-byte synthetic JPEG is chunked into telemetry records and written
//! in each capture format:
//! - `geoscan/pass.kss`: KISS stream with a control frame, an unrelated
//!   telemetry record, two chunks swapped and a retransmitted start
//! - `geoscan/pass.hex`: the same records as hex text, some lines carrying
//!   `|`-separated metadata, plus one truncated line
//! - `stratosat/pass.csv`: timestamped export in the Stratosat layout,
//!   newest line first
//!
//! The source image is written next to each capture as `image.jpg`.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use sat_imager_lib::frame::{Frame, FRAME_LEN, HEADER_LEN};
use sat_imager_lib::frame_decoder::FEND;
use sat_imager_lib::test_utils::{export_lines, fake_jpeg, kiss_encode, RecordGenerator};

const IMAGE_LEN: usize = 300;
const GEOSCAN_BASE: u64 = 0x0200;
const STRATOSAT_BASE: u64 = 0x01_2345;

/// Housekeeping record sharing the first marker byte with the image stream
fn telemetry_record(first: u8) -> Vec<u8> {
    let mut record = vec![first, 0x00, 0x16, 0x00, 0x00, 0x00, 0x00, 0x00];
    record.extend_from_slice(&[0xC0, 0xDB]);
    record.resize(FRAME_LEN, 0x55);
    record
}

fn geoscan_records(image: &[u8]) -> Vec<Vec<u8>> {
    let chunks = RecordGenerator::geoscan().chunk_image(image, GEOSCAN_BASE);

    let mut records = vec![chunks[0].clone(), telemetry_record(0x01)];
    records.extend(chunks[1..].iter().cloned());
    records.swap(3, 4);
    records.push(chunks[0].clone());
    records
}

fn hex_text(records: &[Vec<u8>]) -> String {
    let mut text = String::new();

    for (i, record) in records.iter().enumerate() {
        let hex = hex::encode_upper(record);
        if i % 2 == 1 {
            let grouped: Vec<&str> = hex
                .as_bytes()
                .chunks(8)
                .filter_map(|group| std::str::from_utf8(group).ok())
                .collect();
            text.push_str(&format!(
                "2024-05-01 10:00:{:02} | RX | {}\n",
                i,
                grouped.join(" ")
            ));
        } else {
            text.push_str(&hex);
            text.push('\n');
        }
    }

    // Truncated line from a damaged dump
    let truncated = hex::encode_upper(&records[0]);
    text.push_str(&truncated[..100]);
    text.push('\n');

    text
}

fn stratosat_frames(image: &[u8], start: NaiveDateTime) -> Vec<Frame> {
    let chunks = RecordGenerator::stratosat().chunk_image(image, STRATOSAT_BASE);

    let mut records = vec![telemetry_record(0x02)];
    records.extend(chunks.iter().cloned());
    records.push(chunks[0].clone());

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| Frame::new(start + Duration::seconds(i as i64), record))
        .collect()
}

fn write_fixture(dir: &Path, name: &str, contents: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    fs::write(&path, contents)?;
    println!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

fn main() -> io::Result<()> {
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures");
    let image = fake_jpeg(IMAGE_LEN);
    assert!(IMAGE_LEN > 4 * (FRAME_LEN - HEADER_LEN));

    let geoscan = fixtures.join("geoscan");
    let records = geoscan_records(&image);
    let mut kiss = vec![FEND, 0x01, 0x10, FEND];
    kiss.extend(kiss_encode(&records));
    write_fixture(&geoscan, "pass.kss", &kiss)?;
    write_fixture(&geoscan, "pass.hex", hex_text(&records).as_bytes())?;
    write_fixture(&geoscan, "image.jpg", &image)?;

    let stratosat = fixtures.join("stratosat");
    let start = NaiveDate::from_ymd_opt(2024, 5, 1)
        .and_then(|d| d.and_hms_opt(10, 0, 0))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "bad start time"))?;
    let mut frames = stratosat_frames(&image, start);
    frames.reverse();
    write_fixture(&stratosat, "pass.csv", export_lines(&frames).as_bytes())?;
    write_fixture(&stratosat, "image.jpg", &image)?;

    Ok(())
}
