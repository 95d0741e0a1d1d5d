//! System console
//!
//! `/dev/console` forwards every operation to the device selected by the
//! `console=` kernel parameter.

use crate::devices::devno;
use crate::error::{VfsError, VfsResult};
use crate::file::{self, FileDescription, FileRef};
use crate::inode::{FileOps, Inode, InodeRef};
use crate::types::{FileMode, FileType, OpenFlags, PollEvents, makedev};
use crate::vfs::Vfs;

pub const DEFAULT_CONSOLE: &str = "tty1";

/// Description of the device the console forwards to
struct SystemConsole {
    active: FileRef,
}

fn active_of(desc: &FileDescription) -> VfsResult<&FileRef> {
    Ok(&desc.inode().private::<SystemConsole>()?.active)
}

/// The shared active description always blocks; honour the caller's NONBLOCK here
fn ensure_ready(desc: &FileDescription, active: &FileRef, events: PollEvents) -> VfsResult<()> {
    if desc.flags().contains(OpenFlags::NONBLOCK) && active.poll(events).is_empty() {
        return Err(VfsError::WouldBlock);
    }
    Ok(())
}

fn console_read(desc: &FileDescription, buf: &mut [u8]) -> VfsResult<usize> {
    let active = active_of(desc)?;
    ensure_ready(desc, active, PollEvents::IN)?;
    active.read(buf)
}

fn console_write(desc: &FileDescription, buf: &[u8]) -> VfsResult<usize> {
    let active = active_of(desc)?;
    ensure_ready(desc, active, PollEvents::OUT)?;
    active.write(buf)
}

fn console_ioctl(desc: &FileDescription, request: u32, arg: &mut [u8]) -> VfsResult<usize> {
    active_of(desc)?.ioctl(request, arg)
}

fn console_poll(desc: &FileDescription, events: PollEvents) -> PollEvents {
    match active_of(desc) {
        Ok(active) => active.poll(events),
        Err(_) => PollEvents::ERR,
    }
}

static CONSOLE_OPS: FileOps = FileOps {
    read: Some(console_read),
    write: Some(console_write),
    ioctl: Some(console_ioctl),
    poll: Some(console_poll),
    ..FileOps::EMPTY
};

/// Open the configured console device and register `console` for it
pub fn system_console_init(vfs: &Vfs) -> VfsResult<InodeRef> {
    let name = vfs.config().cmdline.lookup("console").unwrap_or(DEFAULT_CONSOLE);

    let Some(device) = vfs.get_device_by_name(name) else {
        log::warn!("system_console: device {} not found", name);
        return Err(VfsError::NoSuchDevice);
    };
    if device.file_type() != Some(FileType::CharDevice) {
        log::warn!("system_console: device {} is not a character device", name);
        return Err(VfsError::NoSuchDevice);
    }
    let active = match file::open(&device, OpenFlags::RDWR, FileMode::default()) {
        Ok(active) => active,
        Err(err) => {
            log::warn!("system_console: failed to open device {}: {}", name, err);
            return Err(err);
        }
    };
    log::info!("system_console: using {}", name);

    let console = Inode::new(&CONSOLE_OPS, FileMode::new(FileMode::S_IFCHR | 0o600), SystemConsole { active })
        .with_rdev(makedev(devno::TTY_MAJOR, devno::CONSOLE_MINOR))
        .with_nlink(1)
        .into_ref();
    vfs.register_device("console", console.clone())?;
    Ok(console)
}
