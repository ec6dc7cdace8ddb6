//! The static page a view loads before it can speak the protocol.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scheme of asset references handed to views.
pub const RESOURCE_SCHEME: &str = "view-resource";

const TITLE: &str = "OFD Viewer";

/// Where the bundled view assets live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetLayout {
	/// Media directory, relative to the install root.
	pub root: PathBuf,
	/// Scripts in load order.
	pub scripts: Vec<String>,
	/// Stylesheets in load order.
	pub styles: Vec<String>,
}

impl Default for AssetLayout {
	fn default() -> Self {
		Self {
			root: PathBuf::from("media"),
			scripts: ["ofd.umd.js", "ofdViewer.js", "ofdViewerVue.js"].map(String::from).to_vec(),
			styles: ["reset.css", "vscode.css", "ofdViewer.css"].map(String::from).to_vec(),
		}
	}
}

impl AssetLayout {
	/// Resolves an asset name into a reference a view can load.
	pub fn resource(&self, name: &str) -> String {
		let root = self.root.to_string_lossy();
		let root = root.trim_matches('/');
		let name = name.trim_start_matches('/');
		if root.is_empty() {
			format!("{RESOURCE_SCHEME}://{name}")
		} else {
			format!("{RESOURCE_SCHEME}://{root}/{name}")
		}
	}
}

/// Bootstrap payload for one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPage {
	nonce: String,
	title: String,
	scripts: Vec<String>,
	styles: Vec<String>,
}

impl BootstrapPage {
	/// Resolves `layout` and draws a fresh nonce.
	pub fn new(layout: &AssetLayout) -> Self {
		Self {
			nonce: Uuid::new_v4().simple().to_string(),
			title: TITLE.to_string(),
			scripts: layout.scripts.iter().map(|s| layout.resource(s)).collect(),
			styles: layout.styles.iter().map(|s| layout.resource(s)).collect(),
		}
	}

	/// Nonce that scripts must carry to run.
	pub fn nonce(&self) -> &str {
		&self.nonce
	}

	/// Resolved script references.
	pub fn scripts(&self) -> &[String] {
		&self.scripts
	}

	/// Resolved stylesheet references.
	pub fn styles(&self) -> &[String] {
		&self.styles
	}

	/// Renders the HTML shell.
	pub fn render(&self) -> String {
		let mut html = String::from("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n");
		html.push_str(&format!(
			"<meta http-equiv=\"Content-Security-Policy\" content=\"default-src 'none'; script-src 'nonce-{}'; style-src {RESOURCE_SCHEME}:; img-src {RESOURCE_SCHEME}: data:;\">\n",
			self.nonce
		));
		html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
		for style in &self.styles {
			html.push_str(&format!("<link href=\"{style}\" rel=\"stylesheet\" />\n"));
		}
		html.push_str(&format!("<title>{}</title>\n</head>\n<body>\n", self.title));
		html.push_str("<div id=\"app\"><div id=\"ofd-container\"></div></div>\n");
		for script in &self.scripts {
			html.push_str(&format!(
				"<script type=\"module\" nonce=\"{}\" src=\"{script}\"></script>\n",
				self.nonce
			));
		}
		html.push_str("</body>\n</html>\n");
		html
	}
}
