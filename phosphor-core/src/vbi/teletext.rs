//! World System Teletext line encoder and page store.
//!
//! Pages are Level-1 (24 rows x 40 columns) loaded from an EP1 `.tti`
//! directory. The generator walks the page list with an insertion cursor,
//! emitting one 45-byte packet per assigned VBI line: clock run-in, framing
//! code, Hamming 8/4 protected magazine/row address, then either the hammed
//! header block with the rolling clock or 40 odd-parity display bytes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::warn;

use crate::errors::TeletextError;
use crate::modes::ModeDescriptor;

/// Clock run-in bytes, transmitted ahead of every packet.
pub const CRI: [u8; 2] = [0x55, 0x55];
/// Framing code; LSB-first transmission puts 11100100 on air.
pub const FRAMING: u8 = 0x27;
/// Teletext data rate is 444 times the line rate.
pub const BITS_PER_LINE_RATE: u64 = 444;
/// Data amplitude relative to white.
pub const DATA_LEVEL: f64 = 0.66;

/// Hamming 8/4 code table from the teletext specification.
pub const HAMMING_8_4: [u8; 16] = [
    0x15, 0x02, 0x49, 0x5E, 0x64, 0x73, 0x38, 0x2F, 0xD0, 0xC7, 0x8C, 0x9B, 0xA1, 0xB6, 0xFD,
    0xEA,
];

/// Protect a 4-bit value with Hamming 8/4.
#[inline]
pub fn hamming_8_4(value: u8) -> u8 {
    HAMMING_8_4[(value & 0xF) as usize]
}

/// Verify a received Hamming 8/4 byte without correction.
pub fn hamming_8_4_valid(byte: u8) -> bool {
    HAMMING_8_4.contains(&byte)
}

/// Apply odd parity to a 7-bit display byte.
#[inline]
pub fn odd_parity(byte: u8) -> u8 {
    let b = byte & 0x7F;
    if b.count_ones() % 2 == 0 {
        b | 0x80
    } else {
        b
    }
}

/// One Level-1 teletext page.
#[derive(Debug, Clone)]
pub struct Page {
    pub page: u16,
    pub subpage: u16,
    /// Rows 1..=23; row 0 is synthesized from the rolling header.
    pub rows: [[u8; 40]; 24],
    pub row_present: [bool; 24],
}

impl Page {
    fn blank(page: u16, subpage: u16) -> Self {
        Self {
            page,
            subpage,
            rows: [[b' '; 40]; 24],
            row_present: [false; 24],
        }
    }
}

/// A 45-byte line packet ready for NRZ rendering.
pub type Packet = [u8; 45];

/// Page store plus transmission cursor.
pub struct TeletextGenerator {
    pages: BTreeMap<(u16, u16), Page>,
    /// (page key, next row) transmission position.
    cursor: Option<((u16, u16), usize)>,
    /// Rolling header clock text, 8 columns.
    clock: [u8; 8],
    header_caption: [u8; 24],
}

impl TeletextGenerator {
    pub fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
            cursor: None,
            clock: *b"00:00:00",
            header_caption: *b" PHOSPHOR 100           ",
        }
    }

    /// Load every `.tti` page file in `dir`.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize, TeletextError> {
        let entries = fs::read_dir(dir).map_err(|source| TeletextError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let mut loaded = 0;
        for entry in entries {
            let entry = entry.map_err(|source| TeletextError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tti") {
                continue;
            }
            match self.load_tti(&path) {
                Ok(()) => loaded += 1,
                Err(err) => warn!("skipping teletext page {}: {}", path.display(), err),
            }
        }
        Ok(loaded)
    }

    /// Parse one EP1 `.tti` file into the store.
    pub fn load_tti(&mut self, path: &Path) -> Result<(), TeletextError> {
        let text = fs::read_to_string(path).map_err(|source| TeletextError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = path.display().to_string();
        let mut page = Page::blank(0x100, 0);
        let mut seen_pn = false;
        for line in text.lines() {
            let Some((tag, rest)) = line.split_once(',') else {
                continue;
            };
            match tag {
                "PN" => {
                    // Five hex digits: page (3) + subpage (2)
                    let value =
                        u32::from_str_radix(rest.trim(), 16).map_err(|_| {
                            TeletextError::MalformedPage {
                                path: name.clone(),
                                reason: format!("bad PN value {rest:?}"),
                            }
                        })?;
                    let (number, subpage) = if rest.trim().len() > 3 {
                        ((value >> 8) as u16, (value & 0xFF) as u16)
                    } else {
                        (value as u16, 0)
                    };
                    if !(0x100..=0x8FF).contains(&number) {
                        return Err(TeletextError::PageOutOfRange { page: number });
                    }
                    page.page = number;
                    page.subpage = subpage;
                    seen_pn = true;
                }
                "OL" => {
                    let Some((row_str, content)) = rest.split_once(',') else {
                        continue;
                    };
                    let row: usize =
                        row_str.trim().parse().map_err(|_| TeletextError::MalformedPage {
                            path: name.clone(),
                            reason: format!("bad OL row {row_str:?}"),
                        })?;
                    if row == 0 || row > 23 {
                        continue;
                    }
                    let decoded = decode_ep1(content);
                    let cols = decoded.len().min(40);
                    page.rows[row][..cols].copy_from_slice(&decoded[..cols]);
                    page.row_present[row] = true;
                }
                // Subpage, cycle time, description, status: no effect on a
                // single-subpage carousel
                "SP" | "CY" | "DE" | "SC" | "PS" | "CT" | "FL" | "RE" | "MS" => {}
                _ => {}
            }
        }
        if !seen_pn {
            return Err(TeletextError::MalformedPage {
                path: name,
                reason: "missing PN record".to_string(),
            });
        }
        self.pages.insert((page.page, page.subpage), page);
        Ok(())
    }

    /// Replace the subtitle page (888) content with up to two centred rows.
    pub fn set_subtitle(&mut self, text: Option<&str>) {
        let key = (0x888, 0);
        match text {
            None => {
                self.pages.remove(&key);
            }
            Some(text) => {
                let mut page = Page::blank(0x888, 0);
                for (i, line) in text.lines().take(2).enumerate() {
                    let row = 20 + i * 2;
                    let bytes = line.as_bytes();
                    let len = bytes.len().min(38);
                    let left = (40 - len) / 2;
                    page.rows[row][left..left + len].copy_from_slice(&bytes[..len]);
                    page.row_present[row] = true;
                }
                self.pages.insert(key, page);
            }
        }
    }

    /// Update the rolling header clock.
    pub fn set_clock(&mut self, hours: u32, minutes: u32, seconds: u32) {
        let text = format!("{hours:02}:{minutes:02}:{seconds:02}");
        self.clock.copy_from_slice(&text.as_bytes()[..8]);
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Produce the next packet of the carousel, or a filler packet when the
    /// store is empty.
    pub fn next_packet(&mut self) -> Packet {
        let Some((&first_key, _)) = self.pages.iter().next() else {
            // Quiet carousel: transmit the time-filling header of page 8FF
            return header_packet(0x8FF, 0, &self.header_caption, &self.clock);
        };

        let (key, row) = self.cursor.unwrap_or((first_key, 0));
        let page = match self.pages.get(&key) {
            Some(page) => page,
            None => {
                self.cursor = None;
                return self.next_packet();
            }
        };

        if row == 0 {
            self.cursor = Some((key, 1));
            return header_packet(page.page, page.subpage, &self.header_caption, &self.clock);
        }

        // Find the next present row, else move to the next page
        let mut next_row = row;
        while next_row <= 23 && !page.row_present[next_row] {
            next_row += 1;
        }
        if next_row > 23 {
            let next_key = self
                .pages
                .range((std::ops::Bound::Excluded(key), std::ops::Bound::Unbounded))
                .next()
                .map(|(&k, _)| k)
                .unwrap_or(first_key);
            self.cursor = Some((next_key, 0));
            return self.next_packet();
        }

        let packet = row_packet(page.page, next_row as u8, &page.rows[next_row]);
        self.cursor = Some((key, next_row + 1));
        packet
    }

    /// Render one packet into a line buffer at the mode's data timing.
    pub fn render_line(&mut self, mode: &ModeDescriptor, buf: &mut [f64]) {
        let packet = self.next_packet();
        let line_rate = mode.line_rate();
        // bits/sample = 444 * line_rate / sample_rate
        let bit_num = BITS_PER_LINE_RATE * line_rate.num() as u64 * mode.sample_rate.den() as u64;
        let bit_den = line_rate.den() as u64 * mode.sample_rate.num() as u64;
        // Run-in starts with the blanking interval over; 360 bits then fit
        // inside the remaining line
        let start = mode.active_start;
        super::render_nrz(
            &packet,
            start,
            bit_num,
            bit_den,
            DATA_LEVEL * mode.levels.white,
            buf,
        );
    }
}

impl Default for TeletextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode EP1 escape sequences: ESC + (value + 0x40) encodes 0x00..0x1F.
fn decode_ep1(content: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(40);
    let mut bytes = content.bytes();
    while let Some(b) = bytes.next() {
        if b == 0x1B {
            if let Some(next) = bytes.next() {
                out.push(next.wrapping_sub(0x40) & 0x7F);
            }
        } else {
            out.push(b & 0x7F);
        }
    }
    out
}

fn packet_prelude(magazine: u8, row: u8) -> Packet {
    let mut packet = [0u8; 45];
    packet[0] = CRI[0];
    packet[1] = CRI[1];
    packet[2] = FRAMING;
    packet[3] = hamming_8_4(magazine | ((row & 1) << 3));
    packet[4] = hamming_8_4(row >> 1);
    packet
}

/// Magazine number for a page: the hundreds digit, with 8 wrapping to 0.
fn magazine_of(page: u16) -> u8 {
    ((page >> 8) & 0x7) as u8
}

/// Build a row 1..=23 display packet.
pub fn row_packet(page: u16, row: u8, text: &[u8; 40]) -> Packet {
    let mut packet = packet_prelude(magazine_of(page), row);
    for (i, &ch) in text.iter().enumerate() {
        packet[5 + i] = odd_parity(ch);
    }
    packet
}

/// Build a page header (row 0) packet with the rolling clock.
pub fn header_packet(page: u16, subpage: u16, caption: &[u8; 24], clock: &[u8; 8]) -> Packet {
    let mut packet = packet_prelude(magazine_of(page), 0);
    packet[5] = hamming_8_4((page & 0xF) as u8);
    packet[6] = hamming_8_4(((page >> 4) & 0xF) as u8);
    // Subcode S1..S4 with the control bits folded in; C4..C6 clear
    packet[7] = hamming_8_4((subpage & 0xF) as u8);
    packet[8] = hamming_8_4(((subpage >> 4) & 0x7) as u8);
    packet[9] = hamming_8_4(0);
    packet[10] = hamming_8_4(0);
    // C7..C14: suppress header off, update off
    packet[11] = hamming_8_4(0);
    packet[12] = hamming_8_4(0);
    for (i, &ch) in caption.iter().enumerate() {
        packet[13 + i] = odd_parity(ch);
    }
    for (i, &ch) in clock.iter().enumerate() {
        packet[37 + i] = odd_parity(ch);
    }
    packet
}
