use std::fmt;

use super::types::{LocationConfig, ServerConfig};

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  \x1b[38;5;244m───────────────────────────────────────────────\x1b[0m"
        )?;
        writeln!(
            f,
            "  \x1b[1;34m⦿\x1b[0m \x1b[1;37mNetwork:\x1b[0m     \x1b[32m{}\x1b[0m \x1b[38;5;244mport\x1b[0m \x1b[1;32m{}\x1b[0m",
            self.host, self.port
        )?;
        writeln!(
            f,
            "  \x1b[1;34m⦿\x1b[0m \x1b[1;37mServer names:\x1b[0m \x1b[36m{}\x1b[0m",
            if self.server_names.is_empty() {
                "(default only)".to_string()
            } else {
                self.server_names.join(", ")
            }
        )?;
        writeln!(
            f,
            "  \x1b[1;34m⦿\x1b[0m \x1b[1;37mBody Limit:\x1b[0m  \x1b[33m{} KB\x1b[0m",
            self.client_max_body_size / 1024
        )?;

        if !self.error_pages.is_empty() {
            writeln!(f, "  \x1b[1;34m⦿\x1b[0m \x1b[1;37mError Pages:\x1b[0m")?;
            for (code, path) in &self.error_pages {
                writeln!(f, "    \x1b[38;5;244m{:4}\x1b[0m → \x1b[31m{}\x1b[0m", code, path)?;
            }
        }

        writeln!(
            f,
            "\n  \x1b[1;37m📋 LOCATIONS ({}) \x1b[0m",
            self.locations.len()
        )?;
        writeln!(
            f,
            "  \x1b[38;5;244m───────────────────────────────────────────────\x1b[0m"
        )?;

        for (idx, location) in self.locations.iter().enumerate() {
            let is_last = idx == self.locations.len() - 1;
            let branch = if is_last { "  └──" } else { "  ├──" };
            writeln!(f, "  \x1b[38;5;244m{}\x1b[0m \x1b[1;37m{}\x1b[0m", branch, location.path)?;
            location.fmt_details(f, is_last)?;
            if !is_last {
                writeln!(f, "  \x1b[38;5;244m    │\x1b[0m")?;
            }
        }
        Ok(())
    }
}

impl LocationConfig {
    pub(crate) fn fmt_details(&self, f: &mut fmt::Formatter<'_>, is_last: bool) -> fmt::Result {
        let indent = if is_last { "     " } else { "  │  " };
        let methods_fmt = if self.methods.is_empty() {
            "ALL".to_string()
        } else {
            self.methods.iter().cloned().collect::<Vec<_>>().join(" | ")
        };

        writeln!(f, "  \x1b[38;5;250m{}├─ Methods:\x1b[0m {}", indent, methods_fmt)?;
        writeln!(f, "  \x1b[38;5;250m{}├─ Root:\x1b[0m    \x1b[32m{}\x1b[0m", indent, self.root)?;
        writeln!(f, "  \x1b[38;5;250m{}├─ Index:\x1b[0m   \x1b[36m{}\x1b[0m", indent, self.index)?;
        writeln!(
            f,
            "  \x1b[38;5;250m{}├─ Autoindex:\x1b[0m \x1b[{}m{}\x1b[0m",
            indent,
            if self.autoindex { "32" } else { "31" },
            if self.autoindex { "ON" } else { "OFF" }
        )?;

        if !self.redirect.is_empty() {
            writeln!(f, "  \x1b[38;5;250m{}├─ Redirect:\x1b[0m \x1b[35m{}\x1b[0m", indent, self.redirect)?;
        }
        if !self.cgi_extensions.is_empty() {
            writeln!(
                f,
                "  \x1b[38;5;250m{}└─ CGI:\x1b[0m     \x1b[38;5;208m{} -> {:?}\x1b[0m",
                indent, self.cgi_path, self.cgi_extensions
            )?;
        } else {
            writeln!(f, "  \x1b[38;5;250m{}└─ CGI:\x1b[0m      \x1b[31mDISABLED\x1b[0m", indent)?;
        }
        Ok(())
    }
}

pub fn display_config(servers: &[ServerConfig]) {
    println!("\n\x1b[1;35m 🌐 SERVER CONFIGURATION\x1b[0m");
    println!("\x1b[38;5;240m ════════════════════════════════════════════════════════════════\x1b[0m");
    for (i, server) in servers.iter().enumerate() {
        println!("\n  \x1b[1;37mSERVER BLOCK {:02}\x1b[0m", i + 1);
        print!("{}", server);
    }
    println!("\x1b[38;5;240m ════════════════════════════════════════════════════════════════\x1b[0m");
}
