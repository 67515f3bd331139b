// dbvault/src/codec.rs
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Gzips `source` into `dest` at best compression. Returns bytes read.
pub fn gzip_file(source: &Path, dest: &Path) -> io::Result<u64> {
    let mut input = BufReader::new(File::open(source)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(dest)?), Compression::best());
    let copied = io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(copied)
}

/// Inflates gzip `source` into `dest`. Returns bytes written.
pub fn gunzip_file(source: &Path, dest: &Path) -> io::Result<u64> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(source)?));
    let mut output = BufWriter::new(File::create(dest)?);
    let copied = io::copy(&mut decoder, &mut output)?;
    output.flush()?;
    Ok(copied)
}
