//! ARM boot tags.
//!
//! The firmware hands the loader a list of tagged records describing
//! the machine. Each record starts with a two word header (length in
//! words, including the header, then the tag code) and the list ends
//! with a null tag. The loader only uses them for display and to
//! tell the board models apart.

use crate::{
    hal::serial::{Hex, Write},
    uprintln,
};
use byteorder::{ByteOrder, LittleEndian};
use core::str;

pub const NONE: u32 = 0x0000_0000;
pub const CORE: u32 = 0x5441_0001;
pub const MEM: u32 = 0x5441_0002;
pub const VIDEOTEXT: u32 = 0x5441_0003;
pub const RAMDISK: u32 = 0x5441_0004;
pub const INITRD2: u32 = 0x5442_0005;
pub const SERIAL: u32 = 0x5441_0006;
pub const REVISION: u32 = 0x5441_0007;
pub const VIDEOLFB: u32 = 0x5441_0008;
pub const CMDLINE: u32 = 0x5441_0009;

const HEADER_WORDS: usize = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Core {
    pub writable: bool,
    pub page_size: u32,
    pub root_device: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Mem {
    pub size: u32,
    pub start: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VideoText {
    pub x: u8,
    pub y: u8,
    pub page: u16,
    pub mode: u8,
    pub cols: u8,
    pub ega_bx: u16,
    pub lines: u8,
    pub is_vga: u8,
    pub points: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ramdisk {
    pub load: bool,
    pub prompt: bool,
    pub size: u32,
    pub start: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Initrd2 {
    pub start: u32,
    pub size: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SerialNumber {
    pub low: u32,
    pub high: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VideoLfb {
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub line_length: u16,
    pub base: u32,
    pub size: u32,
    pub red_size: u8,
    pub red_pos: u8,
    pub green_size: u8,
    pub green_pos: u8,
    pub blue_size: u8,
    pub blue_pos: u8,
    pub rsvd_size: u8,
    pub rsvd_pos: u8,
}

/// A decoded boot tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Atag<'a> {
    None,
    Core(Core),
    Mem(Mem),
    VideoText(VideoText),
    Ramdisk(Ramdisk),
    Initrd2(Initrd2),
    Serial(SerialNumber),
    Revision(u32),
    VideoLfb(VideoLfb),
    Cmdline(&'a str),
    Unknown { tag: u32, size: u32 },
}

/// Record body, tolerant of records shorter than their tag implies.
struct Body<'a> {
    words: &'a [u32],
    bytes: &'a [u8],
}

impl<'a> Body<'a> {
    fn new(words: &'a [u32]) -> Self { Self { words, bytes: bytemuck::cast_slice(words) } }

    fn word(&self, index: usize) -> u32 { self.words.get(index).copied().unwrap_or(0) }

    fn byte(&self, offset: usize) -> u8 { self.bytes.get(offset).copied().unwrap_or(0) }

    fn half(&self, offset: usize) -> u16 {
        self.bytes.get(offset..offset + 2).map(LittleEndian::read_u16).unwrap_or(0)
    }

    /// NUL terminated string filling the body. Invalid UTF-8 cuts it short.
    fn string(&self) -> &'a str {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(self.bytes.len());
        let bytes = &self.bytes[..end];
        match str::from_utf8(bytes) {
            Ok(text) => text,
            Err(error) => str::from_utf8(&bytes[..error.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl<'a> Atag<'a> {
    fn decode(tag: u32, size: u32, words: &'a [u32]) -> Self {
        let body = Body::new(words);
        match tag {
            NONE => Atag::None,
            CORE => Atag::Core(Core {
                writable: body.word(0) & 1 != 0,
                page_size: body.word(1),
                root_device: body.word(2),
            }),
            MEM => Atag::Mem(Mem { size: body.word(0), start: body.word(1) }),
            VIDEOTEXT => Atag::VideoText(VideoText {
                x: body.byte(0),
                y: body.byte(1),
                page: body.half(2),
                mode: body.byte(4),
                cols: body.byte(5),
                ega_bx: body.half(6),
                lines: body.byte(8),
                is_vga: body.byte(9),
                points: body.half(10),
            }),
            RAMDISK => Atag::Ramdisk(Ramdisk {
                load: body.word(0) & 0b01 != 0,
                prompt: body.word(0) & 0b10 != 0,
                size: body.word(1),
                start: body.word(2),
            }),
            INITRD2 => Atag::Initrd2(Initrd2 { start: body.word(0), size: body.word(1) }),
            SERIAL => Atag::Serial(SerialNumber { low: body.word(0), high: body.word(1) }),
            REVISION => Atag::Revision(body.word(0)),
            VIDEOLFB => Atag::VideoLfb(VideoLfb {
                width: body.half(0),
                height: body.half(2),
                depth: body.half(4),
                line_length: body.half(6),
                base: body.word(2),
                size: body.word(3),
                red_size: body.byte(16),
                red_pos: body.byte(17),
                green_size: body.byte(18),
                green_pos: body.byte(19),
                blue_size: body.byte(20),
                blue_pos: body.byte(21),
                rsvd_size: body.byte(22),
                rsvd_pos: body.byte(23),
            }),
            CMDLINE => Atag::Cmdline(body.string()),
            tag => Atag::Unknown { tag, size },
        }
    }

    /// Prints a single diagnostic line describing the tag.
    pub fn report<S: Write<u8>>(&self, mut serial: &mut S) -> Result<(), S::Error> {
        let flag = |set: bool| if set { "true" } else { "false" };
        match self {
            Atag::None => uprintln!(serial, "NONE"),
            Atag::Core(core) => uprintln!(
                serial,
                "Core: writable = {}, pagesize = {}, rootdev = {}",
                flag(core.writable),
                Hex(core.page_size),
                Hex(core.root_device)
            ),
            Atag::Mem(mem) => {
                uprintln!(serial, "Mem: start = {}, size = {}", Hex(mem.start), Hex(mem.size))
            }
            Atag::VideoText(video) => uprintln!(
                serial,
                "Videotext: x = {}, y = {}, page = {}, mode = {}, cols = {}, ega_bx = {}, lines = {}, isvga = {}, points = {}",
                video.x,
                video.y,
                video.page,
                video.mode,
                video.cols,
                video.ega_bx,
                video.lines,
                video.is_vga,
                video.points
            ),
            Atag::Ramdisk(ramdisk) => uprintln!(
                serial,
                "Ramdisk: load = {}, prompt = {}, size = {}, start = {}",
                flag(ramdisk.load),
                flag(ramdisk.prompt),
                Hex(ramdisk.size),
                Hex(ramdisk.start)
            ),
            Atag::Initrd2(initrd) => uprintln!(
                serial,
                "Initrd2: start = {}, size = {}",
                Hex(initrd.start),
                Hex(initrd.size)
            ),
            Atag::Serial(number) => {
                uprintln!(serial, "Serial: low = {}, high = {}", number.low, number.high)
            }
            Atag::Revision(revision) => uprintln!(serial, "Revision: rev = {}", Hex(*revision)),
            Atag::VideoLfb(lfb) => uprintln!(
                serial,
                "VideoLFB: width = {}, height = {}, depth = {}, linelength = {}, base = {}, size = {}, red = {}@{}, green = {}@{}, blue = {}@{}, rsvd = {}@{}",
                lfb.width,
                lfb.height,
                lfb.depth,
                lfb.line_length,
                Hex(lfb.base),
                Hex(lfb.size),
                lfb.red_size,
                lfb.red_pos,
                lfb.green_size,
                lfb.green_pos,
                lfb.blue_size,
                lfb.blue_pos,
                lfb.rsvd_size,
                lfb.rsvd_pos
            ),
            Atag::Cmdline(cmdline) => uprintln!(serial, "Cmdline: '{}'", *cmdline),
            Atag::Unknown { tag, size } => {
                uprintln!(serial, "Unknown tag tag = {}, tag_size = {}", Hex(*tag), *size)
            }
        }
    }
}

/// Iterator over a tag list laid out in a flat word buffer.
///
/// Yields each tag with the address of its header, finishing after
/// the null tag, at the end of the buffer, or at the first record
/// whose length is impossible.
#[derive(Clone)]
pub struct Atags<'a> {
    words: &'a [u32],
    address: usize,
    finished: bool,
}

impl<'a> Atags<'a> {
    /// `base` is the address `words` was read from, for display only.
    pub fn new(words: &'a [u32], base: usize) -> Self {
        Self { words, address: base, finished: false }
    }

    pub fn empty() -> Self { Self::new(&[], 0) }

    /// The kernel command line, if the firmware passed one.
    pub fn cmdline(&self) -> Option<&'a str> {
        self.clone().find_map(|(_, atag)| match atag {
            Atag::Cmdline(cmdline) => Some(cmdline),
            _ => None,
        })
    }
}

impl<'a> Iterator for Atags<'a> {
    type Item = (usize, Atag<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.words.len() < HEADER_WORDS {
            self.finished = true;
            return None;
        }

        let (size, tag) = (self.words[0], self.words[1]);
        let address = self.address;
        if tag == NONE {
            self.finished = true;
            return Some((address, Atag::None));
        }

        let length = size as usize;
        if length < HEADER_WORDS || length > self.words.len() {
            self.finished = true;
            return None;
        }

        let atag = Atag::decode(tag, size, &self.words[HEADER_WORDS..length]);
        self.words = &self.words[length..];
        self.address += length * 4;
        Some((address, atag))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hal::doubles::serial::ScriptedSerial;

    fn cmdline_words(text: &str) -> Vec<u32> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes.chunks(4).map(LittleEndian::read_u32).collect()
    }

    fn sample_list() -> Vec<u32> {
        let mut words = vec![5, CORE, 1, 0x1000, 0, 4, MEM, 0x1C00_0000, 0];
        let cmdline = cmdline_words("bcm2708.disk_led_gpio=47 console=ttyAMA0");
        words.push(cmdline.len() as u32 + 2);
        words.push(CMDLINE);
        words.extend(cmdline);
        words.extend([0, NONE]);
        words
    }

    #[test]
    fn walking_a_complete_tag_list() {
        // Given
        let words = sample_list();

        // When
        let tags: Vec<_> = Atags::new(&words, 0x100).collect();

        // Then
        assert_eq!(4, tags.len());
        assert_eq!(
            (0x100, Atag::Core(Core { writable: true, page_size: 0x1000, root_device: 0 })),
            tags[0]
        );
        assert_eq!((0x114, Atag::Mem(Mem { size: 0x1C00_0000, start: 0 })), tags[1]);
        assert_eq!(Atag::Cmdline("bcm2708.disk_led_gpio=47 console=ttyAMA0"), tags[2].1);
        assert_eq!(Atag::None, tags[3].1);
    }

    #[test]
    fn command_line_is_found_anywhere_in_the_list() {
        let words = sample_list();
        assert_eq!(
            Some("bcm2708.disk_led_gpio=47 console=ttyAMA0"),
            Atags::new(&words, 0).cmdline()
        );
        assert_eq!(None, Atags::empty().cmdline());
    }

    #[test]
    fn malformed_lengths_end_the_walk() {
        // Zero length record would loop forever if followed
        let words = [0, MEM, 1, 2];
        assert_eq!(0, Atags::new(&words, 0).count());

        // Record claiming more words than are available
        let words = [9, MEM, 1, 2];
        assert_eq!(0, Atags::new(&words, 0).count());
    }

    #[test]
    fn unknown_tags_are_kept_with_their_code() {
        let words = [3, 0x5441_00FF, 7, 0, NONE];
        let tags: Vec<_> = Atags::new(&words, 0).map(|(_, atag)| atag).collect();
        assert_eq!(vec![Atag::Unknown { tag: 0x5441_00FF, size: 3 }, Atag::None], tags);
    }

    #[test]
    fn short_records_decode_missing_fields_as_zero() {
        let words = [2, CORE, 0, NONE];
        let (_, core) = Atags::new(&words, 0).next().unwrap();
        assert_eq!(Atag::Core(Core { writable: false, page_size: 0, root_device: 0 }), core);
    }

    #[test]
    fn reporting_prints_one_line_per_tag() {
        let mut serial = ScriptedSerial::default();
        Atag::Mem(Mem { size: 0x1C00_0000, start: 0 }).report(&mut serial).unwrap();
        Atag::Cmdline("quiet").report(&mut serial).unwrap();
        assert_eq!(
            "Mem: start = 0x00000000, size = 0x1c000000\r\nCmdline: 'quiet'\r\n",
            String::from_utf8(serial.outgoing).unwrap()
        );
    }
}
