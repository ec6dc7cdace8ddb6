//! Headless stand-in for the OFD parse/render library.
//!
//! An OFD file is a zip container. The probe reads its central directory and renders one
//! line per entry, which is enough to tell whether a view received a well-formed document.

use std::io::Cursor;

use ofdview_view::Renderer;
use zip::ZipArchive;

const ROOT_ENTRY: &str = "OFD.xml";
/// Approximate pixel width of one rendered character.
const CHAR_WIDTH: u32 = 8;

/// One file stored in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
	pub name: String,
	pub size: u64,
	pub compressed_size: u64,
}

/// Files found in a container, in central directory order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
	pub entries: Vec<Entry>,
}

impl Container {
	pub fn has_root(&self) -> bool {
		self.entries.iter().any(|e| e.name.eq_ignore_ascii_case(ROOT_ENTRY))
	}
}

/// Lists the entries of an OFD container.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerProbe;

impl Renderer for ContainerProbe {
	type Parsed = Container;
	type Element = String;

	fn parse(&self, bytes: &[u8]) -> Result<Container, String> {
		let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not an OFD document: {e}"))?;

		let mut entries = Vec::with_capacity(archive.len());
		for i in 0..archive.len() {
			// Raw access skips decompression; only the directory record is needed.
			let file = archive.by_index_raw(i).map_err(|e| format!("unreadable zip entry {i}: {e}"))?;
			if file.is_dir() {
				continue;
			}
			entries.push(Entry {
				name: file.name().to_string(),
				size: file.size(),
				compressed_size: file.compressed_size(),
			});
		}

		Ok(Container { entries })
	}

	fn render(&self, viewport_width: u32, parsed: &Container) -> Vec<String> {
		let columns = (viewport_width / CHAR_WIDTH).max(16) as usize;
		let mut lines = Vec::with_capacity(parsed.entries.len() + 1);

		let mut summary = format!("{} entries", parsed.entries.len());
		if !parsed.has_root() {
			summary.push_str(", no OFD.xml");
		}
		lines.push(summary);

		for entry in &parsed.entries {
			let line = format!("{}  {} B", entry.name, entry.size);
			lines.push(line.chars().take(columns).collect());
		}
		lines
	}
}
