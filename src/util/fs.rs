use std::fs;
use std::io;
use std::path::Path;

/// Ensure a directory exists and return its path (creates parents as needed).
pub fn ensure_dir(p: &Path) -> io::Result<&Path> {
    fs::create_dir_all(p)?;
    Ok(p)
}

/// Copy `from` to `to`, replacing any existing file at `to`.
pub fn copy_overwrite(from: &Path, to: &Path) -> io::Result<u64> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if to.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("refusing to overwrite directory {}", to.display()),
        ));
    }
    fs::copy(from, to)
}

/// Stream `reader` into a freshly truncated file at `to`.
pub fn copy_from_reader(reader: &mut dyn io::Read, to: &Path) -> io::Result<u64> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = io::BufWriter::new(fs::File::create(to)?);
    let n = io::copy(reader, &mut out)?;
    io::Write::flush(&mut out)?;
    Ok(n)
}

/// Remove a file or directory tree if present; missing paths are not an error.
pub fn remove_path(p: &Path) -> io::Result<()> {
    match fs::symlink_metadata(p) {
        Ok(md) if md.is_dir() => fs::remove_dir_all(p),
        Ok(_) => fs::remove_file(p),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
