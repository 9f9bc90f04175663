use std::fs::File;
use std::path::Path;

pub const OPS_HEADER: [&str; 7] = ["op", "owner", "currency", "wallet", "target", "amount", "code"];

pub fn write_ops_csv(path: &Path, rows: &[[&str; 7]]) -> csv::Result<()> {
    let file = File::create(path)?;
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(OPS_HEADER)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
