use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color as TableColor, Table};
use hearth::{
    model::Post,
    views::{FriendStatus, PostEngagement},
};
use serde::Serialize;

use crate::theme::{ICONS, THEME};

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
    /// Compact single-line output
    Compact,
}

/// Global CLI options that affect output and behavior
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub no_color: bool,
}

/// Data that can be displayed as a table
pub trait TableDisplay {
    fn to_table(&self, options: &GlobalOptions) -> Table;
    fn to_compact(&self) -> String;
}

pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        Self { options }
    }

    /// Display data according to the configured output format
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay + ?Sized,
    {
        if self.options.quiet {
            return Ok(());
        }

        match self.options.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                println!("{json}");
            }
            OutputFormat::Table => {
                let table = data.to_table(&self.options);
                println!("{table}");
            }
            OutputFormat::Compact => {
                println!("{}", data.to_compact());
            }
        }
        Ok(())
    }

    fn line(&self, icon: &str, message: &str, color: colored::Color) -> String {
        if self.options.no_color {
            format!("{icon} {message}")
        } else {
            format!("{} {}", icon.color(color), message.color(color))
        }
    }

    pub fn success(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.line(ICONS.success, message, THEME.success));
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.line(ICONS.warning, message, THEME.warning));
        }
    }

    pub fn info(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.line(ICONS.info, message, THEME.info));
        }
    }

    /// Display verbose information (only if verbose mode is enabled)
    pub fn verbose(&self, message: &str) {
        if self.options.verbose && !self.options.quiet {
            eprintln!("{}", self.line(ICONS.arrow, message, THEME.muted));
        }
    }

    pub fn heading(&self, text: &str) {
        if !self.options.quiet {
            let output = if self.options.no_color {
                format!("\n{text}\n{}", "=".repeat(text.chars().count()))
            } else {
                format!("\n{}", text.color(THEME.primary).bold())
            };
            println!("{output}");
        }
    }

    pub fn key_value(&self, key: &str, value: &str) {
        if !self.options.quiet {
            let output = if self.options.no_color {
                format!("{key}: {value}")
            } else {
                format!("{}: {}", key.color(THEME.key).bold(), value.color(THEME.value))
            };
            println!("{output}");
        }
    }

    pub fn bullet(&self, text: &str) {
        if !self.options.quiet {
            let output = if self.options.no_color {
                format!("  {} {text}", ICONS.bullet)
            } else {
                format!("  {} {text}", ICONS.bullet.color(THEME.muted))
            };
            println!("{output}");
        }
    }
}

fn themed_table(options: &GlobalOptions, headers: &[&str]) -> Table {
    let mut table = Table::new();
    if options.no_color {
        table.load_preset(comfy_table::presets::ASCII_FULL);
    } else {
        table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
    }
    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|header| {
            let cell = Cell::new(header).add_attribute(Attribute::Bold);
            if options.no_color { cell } else { cell.fg(TableColor::Cyan) }
        })
        .collect();
    table.set_header(header_cells);
    table
}

/// View counter as the feed shows it: `999`, `1.2K`, `3.4M`.
pub fn format_views(views: u64) -> String {
    match views {
        0..=999 => views.to_string(),
        1_000..=999_949 => format_scaled(views as f64 / 1_000.0, "K"),
        _ => format_scaled(views as f64 / 1_000_000.0, "M"),
    }
}

fn format_scaled(value: f64, suffix: &str) -> String {
    let rounded = format!("{value:.1}");
    let trimmed = rounded.strip_suffix(".0").unwrap_or(&rounded);
    format!("{trimmed}{suffix}")
}

fn excerpt(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let cut: String = content.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}…")
}

impl TableDisplay for [Post] {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Post", "Author", "Content", "Likes", "Comments", "Views", "Created"]);
        for post in self {
            let created = post
                .created()
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(&post.id),
                Cell::new(post.author.plain_name()),
                Cell::new(excerpt(&post.content, 40)),
                Cell::new(post.likes.len()),
                Cell::new(post.comments.len()),
                Cell::new(format_views(post.views)),
                Cell::new(created),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.iter()
            .map(|post| format!("{} {}{} {}", post.id, ICONS.heart, post.likes.len(), excerpt(&post.content, 30)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl TableDisplay for [FriendStatus] {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Friend", "Name", "Status"]);
        for friend in self {
            let name = friend.summary.as_ref().map(|summary| summary.plain_name()).unwrap_or_default();
            let status = if friend.online { ICONS.online } else { ICONS.offline };
            table.add_row(vec![Cell::new(&friend.uid), Cell::new(name), Cell::new(status)]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.iter()
            .map(|friend| format!("{}={}", friend.uid, if friend.online { "online" } else { "offline" }))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl TableDisplay for PostEngagement {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Liked", "Bookmarked", "Likes", "Comments", "Views"]);
        table.add_row(vec![
            Cell::new(self.liked_by_me),
            Cell::new(self.bookmarked_by_me),
            Cell::new(self.like_count),
            Cell::new(self.comment_count),
            Cell::new(format_views(self.views)),
        ]);
        table
    }

    fn to_compact(&self) -> String {
        format!(
            "{}{} {}{} comments={} views={}",
            ICONS.heart,
            self.like_count,
            ICONS.bookmark,
            u8::from(self.bookmarked_by_me),
            self.comment_count,
            format_views(self.views)
        )
    }
}
