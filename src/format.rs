const KILOBYTE: u64 = 1024;
const MEGABYTE: u64 = 1024 * KILOBYTE;
const GIGABYTE: u64 = 1024 * MEGABYTE;

/// Render a byte count with binary units and two decimals, e.g. `1.50 KB`.
///
/// Counts below one kilobyte are printed as whole bytes. Anything at or above
/// a gigabyte stays in `GB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes < KILOBYTE {
        format!("{} B", bytes)
    } else if bytes < MEGABYTE {
        format!("{:.2} KB", bytes as f64 / KILOBYTE as f64)
    } else if bytes < GIGABYTE {
        format!("{:.2} MB", bytes as f64 / MEGABYTE as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GIGABYTE as f64)
    }
}
