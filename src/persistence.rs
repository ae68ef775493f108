//! Saving and loading trees.
//!
//! A tree file is a header record followed by one record per node. Each
//! record is written as `[length: u32][crc32: u32][payload: bincode]`, so a
//! damaged or truncated file is detected instead of yielding a broken tree.

use crate::error::{IndexError, Result};
use crate::page::MemoryPageFile;
use crate::tree::{Node, TreeHeader};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

/// First record of a tree file: tree metadata plus family-specific settings.
#[derive(Debug, Serialize, Deserialize)]
struct HeaderRecord<M> {
    header: TreeHeader,
    nodes: u64,
    meta: M,
}

/// Encode data to bincode bytes.
pub fn to_bincode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| IndexError::SerializationError(e.to_string()))
}

/// Decode data from bincode bytes.
pub fn from_bincode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| IndexError::SerializationError(e.to_string()))
}

/// Write a tree to `path`, replacing any existing file.
pub fn save<E, M>(
    path: impl AsRef<Path>,
    header: &TreeHeader,
    meta: &M,
    pages: &MemoryPageFile<Node<E>>,
) -> Result<()>
where
    E: Serialize,
    M: Serialize,
{
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_record(
        &mut writer,
        &HeaderRecord {
            header: header.clone(),
            nodes: pages.num_pages() as u64,
            meta,
        },
    )?;
    for node in pages.iter() {
        write_record(&mut writer, node)?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Read a tree written by [`save`]. The header is read before any node.
pub fn load<E, M>(path: impl AsRef<Path>) -> Result<(TreeHeader, M, MemoryPageFile<Node<E>>)>
where
    E: DeserializeOwned,
    M: DeserializeOwned,
{
    let mut reader = BufReader::new(File::open(path)?);
    let record: HeaderRecord<M> = read_record(&mut reader)?
        .ok_or_else(|| IndexError::corrupted("empty tree file"))?;

    let mut nodes = Vec::new();
    for i in 0..record.nodes {
        let node = read_record(&mut reader)?.ok_or_else(|| {
            IndexError::corrupted(format!(
                "tree file ends after {} of {} nodes",
                i, record.nodes
            ))
        })?;
        nodes.push(node);
    }
    if !reader.fill_buf()?.is_empty() {
        return Err(IndexError::corrupted("trailing data after last node"));
    }
    Ok((record.header, record.meta, MemoryPageFile::from_nodes(nodes)?))
}

fn write_record<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let payload = to_bincode(value)?;
    let crc = crc32fast::hash(&payload);
    let len = payload.len() as u32;

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Read one record. `Ok(None)` at a clean end of file.
fn read_record<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(IndexError::IoError(e)),
    }
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut crc_buf = [0u8; 4];
    read_fully(reader, &mut crc_buf)?;
    let expected_crc = u32::from_le_bytes(crc_buf);

    let mut payload = vec![0u8; len];
    read_fully(reader, &mut payload)?;

    if crc32fast::hash(&payload) != expected_crc {
        return Err(IndexError::corrupted("record checksum mismatch"));
    }
    from_bincode(&payload)
        .map(Some)
        .map_err(|e| IndexError::corrupted(format!("undecodable record: {}", e)))
}

fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => IndexError::corrupted("truncated record"),
        _ => IndexError::IoError(e),
    })
}
