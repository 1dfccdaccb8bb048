//! DEFLATE envelope for `pages.html_compressed`: the highest-ratio codec
//! available without adding a page-identity concern to the storage layer.

use flate2::write::DeflateEncoder;
use flate2::read::DeflateDecoder;
use flate2::Compression;
use std::io::{Read, Write};

use webcrawl_core::CrawlError;

pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CrawlError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(bytes)
        .map_err(|e| CrawlError::Storage(format!("compress: {e}")))?;
    encoder
        .finish()
        .map_err(|e| CrawlError::Storage(format!("compress: {e}")))
}

#[allow(dead_code)]
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CrawlError> {
    let mut decoder = DeflateDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CrawlError::Storage(format!("decompress: {e}")))?;
    Ok(out)
}
