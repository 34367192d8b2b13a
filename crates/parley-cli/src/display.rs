//! Terminal output helpers

use colored::*;

pub fn section(title: &str) {
    println!();
    println!("{}", "━".repeat(60).bright_black());
    println!(" {}", title.bright_white().bold());
    println!("{}", "━".repeat(60).bright_black());
}

pub fn success(message: &str) {
    println!("  {} {}", "✓".bright_green(), message);
}

pub fn error(message: &str) {
    println!("  {} {}", "✗".bright_red(), message.bright_red());
}

pub fn info(message: &str) {
    println!("  {} {}", "→".bright_blue(), message);
}

pub fn warning(message: &str) {
    println!("  {} {}", "⚠".yellow(), message.yellow());
}

/// Indented key-value pair
pub fn kv(key: &str, value: &str) {
    println!("      {}: {}", key, value.bright_cyan());
}

pub fn labeled(label: &str, value: &str) {
    println!("  {}: {}", label.bright_white(), value.bright_cyan());
}

/// Speaker-prefixed conversation line
pub fn turn(speaker: &str, content: &str) {
    println!();
    println!("  {}", speaker.bright_yellow().bold());
    for line in content.lines() {
        println!("    {}", line);
    }
}

/// First `len` characters of `s`, with an ellipsis when cut
pub fn truncate(s: &str, len: usize) -> String {
    if s.chars().count() <= len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(len).collect::<String>())
    }
}
