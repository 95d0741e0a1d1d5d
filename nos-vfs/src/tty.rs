//! TTY character devices
//!
//! Key events from the keyboard driver are translated into bytes and queued;
//! readers block until the queue has data. Output is handed to a
//! [`TerminalSink`] that owns rendering.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicI32, Ordering};

use bitflags::bitflags;
use spin::Mutex;

use crate::block;
use crate::config::VfsConfig;
use crate::devices::devno;
use crate::error::{VfsError, VfsResult};
use crate::file::FileDescription;
use crate::inode::{FileOps, Inode, InodeRef};
use crate::ring_buf::RingBuf;
use crate::types::{FileMode, PollEvents, makedev};

pub mod ioctl {
    pub const TIOCGPGRP: u32 = 0x540F;
    pub const TIOCSPGRP: u32 = 0x5410;
    pub const TIOCGWINSZ: u32 = 0x5413;
}

/// Terminal dimensions as reported by `TIOCGWINSZ`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WinSize {
    pub rows: u16,
    pub cols: u16,
    pub xpixel: u16,
    pub ypixel: u16,
}

impl WinSize {
    pub const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.rows.to_le_bytes());
        out[2..4].copy_from_slice(&self.cols.to_le_bytes());
        out[4..6].copy_from_slice(&self.xpixel.to_le_bytes());
        out[6..8].copy_from_slice(&self.ypixel.to_le_bytes());
    }
}

/// Output side of a terminal: the framebuffer console or a serial port
pub trait TerminalSink: Send + Sync {
    fn write_bytes(&self, bytes: &[u8]);

    fn winsize(&self) -> WinSize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Delete,
    Other,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyModifiers: u8 {
        const SHIFT = 0x1;
        const CTRL  = 0x2;
        const ALT   = 0x4;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    pub keycode: KeyCode,
    /// Character the key produces, if any
    pub key: Option<u8>,
    pub modifiers: KeyModifiers,
    pub pressed: bool,
}

impl KeyEvent {
    pub const fn press(keycode: KeyCode, key: Option<u8>, modifiers: KeyModifiers) -> Self {
        Self { keycode, key, modifiers, pressed: true }
    }
}

pub struct Tty {
    input: Mutex<RingBuf>,
    sink: Mutex<Arc<dyn TerminalSink>>,
    pgrp: AtomicI32,
}

impl Tty {
    fn push(&self, bytes: &[u8]) {
        let dropped = bytes.len() - self.input.lock().write(bytes);
        if dropped > 0 {
            log::warn!("tty: input queue full, dropped {} bytes", dropped);
        }
    }

    /// Translate a key event into input bytes
    pub fn on_key(&self, event: &KeyEvent) {
        if !event.pressed {
            return;
        }
        let sequence: &[u8] = match event.keycode {
            KeyCode::Up => b"\x1b[A",
            KeyCode::Down => b"\x1b[B",
            KeyCode::Right => b"\x1b[C",
            KeyCode::Left => b"\x1b[D",
            KeyCode::Home => b"\x1b[H",
            KeyCode::End => b"\x1b[F",
            KeyCode::Delete => b"\x1b[3~",
            KeyCode::Other => &[],
        };
        if !sequence.is_empty() {
            self.push(sequence);
            block::wake();
            return;
        }

        let Some(mut key) = event.key else {
            return;
        };
        if event.modifiers.contains(KeyModifiers::CTRL) {
            match key {
                b'a'..=b'z' => key -= b'`',
                b'\\' => key = 0x1c,
                _ => {}
            }
        }
        self.push(&[key]);
        block::wake();
    }

    pub fn foreground_pgrp(&self) -> i32 {
        self.pgrp.load(Ordering::Acquire)
    }
}

fn tty_of(inode: &Inode) -> VfsResult<&Tty> {
    inode.private::<Tty>()
}

/// Create `tty<index>` writing to `sink`
pub fn tty_device_create(index: u32, sink: Arc<dyn TerminalSink>, config: &VfsConfig) -> VfsResult<InodeRef> {
    let tty = Tty {
        input: Mutex::new(RingBuf::new(config.tty_queue_size)?),
        sink: Mutex::new(sink),
        pgrp: AtomicI32::new(0),
    };
    Ok(Inode::new(&TTY_OPS, FileMode::new(FileMode::S_IFCHR | 0o620), tty)
        .with_rdev(makedev(devno::VT_MAJOR, index))
        .with_nlink(1)
        .into_ref())
}

/// Feed a key event to the TTY behind `inode`
pub fn tty_on_key(inode: &Inode, event: &KeyEvent) -> VfsResult<()> {
    tty_of(inode)?.on_key(event);
    Ok(())
}

fn tty_read(desc: &FileDescription, dest: &mut [u8]) -> VfsResult<usize> {
    let tty = tty_of(desc.inode())?;
    loop {
        desc.block(|| !tty.input.lock().is_empty())?;

        let mut input = tty.input.lock();
        if input.is_empty() {
            continue;
        }
        return Ok(input.read(dest));
    }
}

fn tty_write(desc: &FileDescription, src: &[u8]) -> VfsResult<usize> {
    let tty = tty_of(desc.inode())?;
    let sink = tty.sink.lock();
    sink.write_bytes(src);
    Ok(src.len())
}

fn tty_ioctl(desc: &FileDescription, request: u32, arg: &mut [u8]) -> VfsResult<usize> {
    let tty = tty_of(desc.inode())?;
    match request {
        ioctl::TIOCGPGRP => {
            let out = arg.get_mut(..4).ok_or(VfsError::InvalidArgument)?;
            out.copy_from_slice(&tty.foreground_pgrp().to_le_bytes());
            Ok(0)
        }
        ioctl::TIOCSPGRP => {
            let bytes: [u8; 4] = arg
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or(VfsError::InvalidArgument)?;
            let pgrp = i32::from_le_bytes(bytes);
            if pgrp < 0 {
                return Err(VfsError::InvalidArgument);
            }
            tty.pgrp.store(pgrp, Ordering::Release);
            Ok(0)
        }
        ioctl::TIOCGWINSZ => {
            let out = arg.get_mut(..WinSize::SIZE).ok_or(VfsError::InvalidArgument)?;
            tty.sink.lock().winsize().encode(out);
            Ok(0)
        }
        _ => Err(VfsError::InvalidArgument),
    }
}

fn tty_poll(desc: &FileDescription, events: PollEvents) -> PollEvents {
    let Ok(tty) = tty_of(desc.inode()) else {
        return PollEvents::ERR;
    };
    let mut ready = PollEvents::OUT;
    if !tty.input.lock().is_empty() {
        ready |= PollEvents::IN;
    }
    ready & events
}

static TTY_OPS: FileOps = FileOps {
    read: Some(tty_read),
    write: Some(tty_write),
    ioctl: Some(tty_ioctl),
    poll: Some(tty_poll),
    ..FileOps::EMPTY
};
