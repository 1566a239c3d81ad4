use block_data::{BlockPool, File};

use crate::{codec::Codec, Error};

/// Append length-prefixed, codec-encoded `entries` to `file` (creating it on
/// first use), packed into as few [`block_data::Block`]s as the pool's
/// block size allows (one entry is never split across two blocks).
pub(crate) fn spill_entries<K, V, C: Codec<K, V>>(
    pool: &BlockPool,
    codec: &C,
    file: &mut Option<File>,
    entries: impl Iterator<Item = (K, V)>,
) -> Result<(), Error> {
    let block_size = pool.block_size();
    let mut buf = Vec::new();

    for (k, v) in entries {
        let encoded = codec.encode(&k, &v);
        let framed_len = 4 + encoded.len();
        assert!(framed_len <= block_size, "spilled entry larger than the block pool's block size");

        if buf.len() + framed_len > block_size {
            flush_buf(pool, file, &mut buf)?;
        }
        buf.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        buf.extend_from_slice(&encoded);
    }

    flush_buf(pool, file, &mut buf)
}

fn flush_buf(pool: &BlockPool, file: &mut Option<File>, buf: &mut Vec<u8>) -> Result<(), Error> {
    if buf.is_empty() {
        return Ok(());
    }
    let block = pool.allocate(std::mem::take(buf))?;
    file.get_or_insert_with(File::default).writer().append(block);
    Ok(())
}

/// Read every `(key, value)` pair out of a spill file, in the order its
/// blocks were appended.
pub(crate) fn read_entries<K, V, C: Codec<K, V>>(file: &File, codec: &C) -> Vec<(K, V)> {
    let mut reader = file.reader();
    let mut out = Vec::new();
    while let Some(block) = reader.next_block() {
        let bytes = block.as_slice();
        let mut offset = 0;
        while offset < bytes.len() {
            let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            let start = offset + 4;
            out.push(codec.decode(&bytes[start..start + len]));
            offset = start + len;
        }
    }
    out
}
