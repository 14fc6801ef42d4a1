//! Embedded minijinja templates for manifests and PowerShell scripts.
//!
//! Output is never auto-escaped; templates escape explicitly with the
//! `xml_escape` and `ps_quote` filters.

use minijinja::{AutoEscape, Environment};
use serde::Serialize;

use crate::errors::{Result, WinappError};

pub const PACKAGED_MANIFEST: &str = "appxmanifest.xml";
pub const SPARSE_MANIFEST: &str = "appxmanifest.sparse.xml";
pub const DEV_CERTIFICATE_SCRIPT: &str = "dev_certificate.ps1";
pub const INSTALL_CERTIFICATE_SCRIPT: &str = "install_certificate.ps1";

pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_template(PACKAGED_MANIFEST, include_str!("../templates/appxmanifest.xml.j2"))?;
        env.add_template(SPARSE_MANIFEST, include_str!("../templates/appxmanifest.sparse.xml.j2"))?;
        env.add_template(DEV_CERTIFICATE_SCRIPT, include_str!("../templates/dev_certificate.ps1.j2"))?;
        env.add_template(
            INSTALL_CERTIFICATE_SCRIPT,
            include_str!("../templates/install_certificate.ps1.j2"),
        )?;
        env.add_filter("xml_escape", xml_escape);
        env.add_filter("ps_quote", ps_quote);
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<String> {
        self.env
            .get_template(name)?
            .render(context)
            .map_err(|e| WinappError::Template(format!("Failed to render {} template: {}", name, e)))
    }
}

/// Escapes the five XML special characters.
pub fn xml_escape(value: String) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Single-quoted PowerShell literal; embedded quotes are doubled.
pub fn ps_quote(value: String) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
