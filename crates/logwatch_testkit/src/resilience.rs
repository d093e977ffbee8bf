//! Filesystem mutation helpers for provoking SUT misbehavior.
//!
//! Everything here is deliberately blunt: truncate the log out from under
//! the writer, take write permission away, mount a tmpfs that is too small
//! to hold what the SUT wants to write. The tmpfs helpers shell out to
//! `mount`/`umount` and therefore need the privileges those commands need.

use std::{io, path::Path, process::ExitStatus};

use thiserror::Error;
use tokio::{fs, process::Command};

#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("{op} failed for `{path}`: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: &'static str,
        status: ExitStatus,
        stderr: String,
    },
}

fn io_err(op: &'static str, path: &Path, source: io::Error) -> ResilienceError {
    ResilienceError::Io {
        op,
        path: path.display().to_string(),
        source,
    }
}

pub async fn file_exists(path: impl AsRef<Path>) -> bool {
    fs::metadata(path.as_ref()).await.is_ok()
}

pub async fn file_size(path: impl AsRef<Path>) -> Result<u64, ResilienceError> {
    let path = path.as_ref();
    let meta = fs::metadata(path)
        .await
        .map_err(|err| io_err("stat", path, err))?;
    Ok(meta.len())
}

/// Empties an existing file without recreating it, so the writer's open
/// descriptor keeps pointing at the now-empty inode.
pub async fn truncate_file(path: impl AsRef<Path>) -> Result<(), ResilienceError> {
    let path = path.as_ref();
    let file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|err| io_err("open", path, err))?;
    file.set_len(0)
        .await
        .map_err(|err| io_err("truncate", path, err))
}

/// Removing a file that is already gone is a successful no-op.
pub async fn delete_file(path: impl AsRef<Path>) -> Result<(), ResilienceError> {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err("delete", path, err)),
    }
}

pub async fn create_read_only_dir(path: impl AsRef<Path>) -> Result<(), ResilienceError> {
    let path = path.as_ref();
    fs::create_dir_all(path)
        .await
        .map_err(|err| io_err("mkdir", path, err))?;
    set_writable(path, false).await
}

pub async fn remove_dir(path: impl AsRef<Path>) -> Result<(), ResilienceError> {
    let path = path.as_ref();
    // a directory made read-only earlier must be writable to be emptied
    let _ = set_writable(path, true).await;
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err("rmdir", path, err)),
    }
}

pub async fn remove_write_permission(path: impl AsRef<Path>) -> Result<(), ResilienceError> {
    set_writable(path.as_ref(), false).await
}

pub async fn add_write_permission(path: impl AsRef<Path>) -> Result<(), ResilienceError> {
    set_writable(path.as_ref(), true).await
}

async fn set_writable(path: &Path, writable: bool) -> Result<(), ResilienceError> {
    let meta = fs::metadata(path)
        .await
        .map_err(|err| io_err("stat", path, err))?;
    let mut perms = meta.permissions();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = perms.mode();
        perms.set_mode(if writable { mode | 0o200 } else { mode & !0o222 });
    }
    #[cfg(not(unix))]
    perms.set_readonly(!writable);

    fs::set_permissions(path, perms)
        .await
        .map_err(|err| io_err("chmod", path, err))
}

/// Mounts a tmpfs of `size_kib` KiB at `path`, creating the mount point.
/// Writes beyond the size fail with ENOSPC, which is exactly the point.
pub async fn create_sized_tmpfs(
    path: impl AsRef<Path>,
    size_kib: u64,
) -> Result<(), ResilienceError> {
    let path = path.as_ref();
    fs::create_dir_all(path)
        .await
        .map_err(|err| io_err("mkdir", path, err))?;
    run(
        "mount",
        Command::new("mount")
            .arg("-t")
            .arg("tmpfs")
            .arg("-o")
            .arg(format!("size={size_kib}k"))
            .arg("tmpfs")
            .arg(path),
    )
    .await
}

pub async fn remove_tmpfs(path: impl AsRef<Path>) -> Result<(), ResilienceError> {
    let path = path.as_ref();
    run("umount", Command::new("umount").arg(path)).await?;
    remove_dir(path).await
}

async fn run(program: &'static str, command: &mut Command) -> Result<(), ResilienceError> {
    let output = command
        .output()
        .await
        .map_err(|source| ResilienceError::Spawn { program, source })?;
    if !output.status.success() {
        return Err(ResilienceError::CommandFailed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
