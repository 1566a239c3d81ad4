use crate::{stream::Writer, Error};

/// Distribute `records` across `writers` according to the `[start, end)`
/// ranges computed from `offsets` (one entry per writer, plus a trailing
/// total), closing every writer once its range has been written.
///
/// `offsets.len()` must equal `writers.len() + 1`. An empty range (`start
/// == end`) is a no-op for that writer beyond the final close, per the
/// scatter contract's empty-range decision (`# 4.3.7`).
pub fn scatter(writers: &mut [Writer], offsets: &[usize], records: &[Vec<u8>]) -> Result<(), Error> {
    assert_eq!(offsets.len(), writers.len() + 1);
    let ranges = net_group::scatter_ranges(offsets);

    for (writer, (start, end)) in writers.iter_mut().zip(ranges) {
        for record in &records[start..end] {
            writer.write_record(record)?;
        }
        writer.close()?;
    }
    Ok(())
}
