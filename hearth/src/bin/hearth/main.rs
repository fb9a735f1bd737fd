mod commands;
mod context;
mod examples;
mod output;
mod theme;

use std::{
    fmt::Write,
    io::{self, Write as IoWrite},
    path::PathBuf,
};

use anyhow::Result;
use clap::{
    ColorChoice, Command, CommandFactory, FromArgMatches, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Color as ClapColor, RgbColor, Style},
    },
    error::ErrorKind,
};
use colored::{Color as ThemeColor, Colorize, control::ShouldColorize};

use commands::{
    content::{CommentArgs, FriendCommands, PostsArgs, ReactArgs, Reaction},
    watch::WatchCommands,
};
use context::AppContext;
use examples::{ExampleGroup, command_examples};
use hearth::config::DEFAULT_CONFIG_FILE;
use output::{GlobalOptions, OutputFormat, OutputManager};
use theme::{ICONS, THEME};

const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[
    ("REDIS_URL", "Redis connection URL (overrides store.redis_url)"),
    ("RUST_LOG", "Log filter, e.g. hearth=debug"),
];

#[derive(Parser)]
#[command(name = "hearth")]
#[command(version = "0.1.0")]
#[command(
    about = "Inspect and drive a hearth social network",
    long_about = r#"Command line companion for the hearth social network:

• Seed demo users and posts
• List posts with filters
• Like, bookmark, comment and befriend as any user
• Watch live views update as data changes

Commands:
  seed       Create demo users and posts
  posts      List posts
  like       Like a post (also: unlike, bookmark, unbookmark)
  friend     Add or remove friends
  comment    Comment on a post
  watch      Follow a live view
  demo       Run the in-memory scenarios
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Enable verbose output and debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Path to the configuration file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", global = true, hide_env_values = true)]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create demo users and posts
    Seed,

    /// List posts, newest first
    Posts(PostsArgs),

    /// Like a post
    Like(ReactArgs),

    /// Remove a like
    Unlike(ReactArgs),

    /// Bookmark a post
    Bookmark(ReactArgs),

    /// Remove a bookmark
    Unbookmark(ReactArgs),

    /// Manage friend lists
    #[command(subcommand)]
    Friend(FriendCommands),

    /// Comment on a post
    Comment(CommentArgs),

    /// Follow a live view until Ctrl-C
    #[command(subcommand)]
    Watch(WatchCommands),

    /// Run the like race, bookmark and presence scenarios in memory
    Demo,
}

impl Cli {
    fn parse_with_styles() -> Self {
        let command = build_cli_command();
        let parsed = command
            .styles(help_styles())
            .try_get_matches()
            .and_then(|matches| Cli::from_arg_matches(&matches));
        match parsed {
            Ok(cli) => cli,
            Err(err) => match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    if let Err(print_err) = err.print()
                        && print_err.kind() != io::ErrorKind::BrokenPipe
                    {
                        eprintln!("Failed to display help: {print_err}");
                    }
                    std::process::exit(0);
                }
                _ => {
                    let _ = print_blank_line_stderr();
                    if let Err(print_err) = err.print()
                        && print_err.kind() != io::ErrorKind::BrokenPipe
                    {
                        eprintln!("Failed to display error: {print_err}");
                    }
                    std::process::exit(err.exit_code());
                }
            },
        }
    }
}

fn build_cli_command() -> Command {
    let use_color = detect_color_support();
    let mut command = Cli::command().after_long_help(render_top_level_appendix(use_color));
    command = command.color(if use_color { ColorChoice::Auto } else { ColorChoice::Never });
    for example in command_examples() {
        if let Some(subcommand) = command.find_subcommand_mut(example.name) {
            *subcommand = subcommand.clone().after_long_help(render_examples(example.groups, use_color));
        }
    }
    command
}

fn render_examples(groups: &[ExampleGroup], use_color: bool) -> String {
    let theme = &THEME;
    let mut buffer = String::new();

    let _ = writeln!(buffer, "{}", stylize("Examples:", theme.highlight, true, use_color));
    for (index, group) in groups.iter().enumerate() {
        let _ = writeln!(buffer, "  {}", stylize(group.title, theme.primary, true, use_color));
        for command in group.commands {
            let arrow = stylize(ICONS.arrow, theme.secondary, false, use_color);
            let _ = writeln!(buffer, "    {arrow} {}", stylize(command, theme.secondary, false, use_color));
        }
        if index + 1 < groups.len() {
            buffer.push('\n');
        }
    }
    buffer
}

fn render_top_level_appendix(use_color: bool) -> String {
    let theme = &THEME;
    let mut buffer = String::new();

    let _ = writeln!(buffer, "{}", stylize("Environment Variables:", theme.highlight, true, use_color));
    for (key, description) in ENVIRONMENT_VARIABLES {
        let key_text = stylize(key, theme.key, true, use_color);
        let _ = writeln!(buffer, "  {key_text}  {}", stylize(description, theme.value, false, use_color));
    }
    buffer.push('\n');

    let tip = stylize(
        "Use 'hearth <command> --help' to view examples for each command.",
        theme.secondary,
        false,
        use_color,
    );
    let _ = writeln!(buffer, "{} {tip}", stylize("Tip:", theme.highlight, true, use_color));
    buffer
}

fn print_blank_line_stderr() -> io::Result<()> {
    let mut stderr = io::stderr();
    IoWrite::write_all(&mut stderr, b"\n")?;
    IoWrite::flush(&mut stderr)
}

fn stylize(text: &str, color: ThemeColor, bold: bool, use_color: bool) -> String {
    if !use_color {
        return text.to_string();
    }
    let styled = text.color(color);
    if bold { styled.bold().to_string() } else { styled.to_string() }
}

fn detect_color_support() -> bool {
    ShouldColorize::from_env().should_colorize()
}

fn help_styles() -> Styles {
    let theme = &THEME;
    Styles::styled()
        .usage(style_from_color(theme.primary).bold())
        .header(style_from_color(theme.highlight).bold())
        .literal(style_from_color(theme.secondary))
        .placeholder(style_from_color(theme.muted))
        .valid(style_from_color(theme.success))
        .invalid(style_from_color(theme.warning))
        .error(style_from_color(theme.error).bold())
}

fn style_from_color(color: ThemeColor) -> Style {
    let clap_color = match color {
        ThemeColor::Red => ClapColor::Ansi(AnsiColor::Red),
        ThemeColor::Green => ClapColor::Ansi(AnsiColor::Green),
        ThemeColor::Yellow => ClapColor::Ansi(AnsiColor::Yellow),
        ThemeColor::Blue => ClapColor::Ansi(AnsiColor::Blue),
        ThemeColor::Magenta => ClapColor::Ansi(AnsiColor::Magenta),
        ThemeColor::Cyan => ClapColor::Ansi(AnsiColor::Cyan),
        ThemeColor::BrightBlack => ClapColor::Ansi(AnsiColor::BrightBlack),
        ThemeColor::BrightBlue => ClapColor::Ansi(AnsiColor::BrightBlue),
        ThemeColor::BrightCyan => ClapColor::Ansi(AnsiColor::BrightCyan),
        ThemeColor::TrueColor { r, g, b } => ClapColor::Rgb(RgbColor(r, g, b)),
        _ => ClapColor::Ansi(AnsiColor::White),
    };
    Style::new().fg_color(Some(clap_color))
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "hearth=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse_with_styles();
    init_logging(cli.verbose);

    if let Err(err) = execute(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }
    let output = OutputManager::new(GlobalOptions {
        output_format: cli.output,
        quiet: cli.quiet,
        verbose: cli.verbose,
        no_color: cli.no_color,
    });

    if let Commands::Demo = cli.command {
        return commands::demo::handle_demo(&output).await;
    }

    let ctx = AppContext::load(&cli.config, cli.redis_url)?;
    output.verbose(&format!("config: {}", ctx.config_path.display()));

    match cli.command {
        Commands::Seed => commands::content::handle_seed(&ctx, &output).await,
        Commands::Posts(args) => commands::content::handle_posts(args, &ctx, &output).await,
        Commands::Like(args) => commands::content::handle_reaction(Reaction::Like, args, &ctx, &output).await,
        Commands::Unlike(args) => commands::content::handle_reaction(Reaction::Unlike, args, &ctx, &output).await,
        Commands::Bookmark(args) => commands::content::handle_reaction(Reaction::Bookmark, args, &ctx, &output).await,
        Commands::Unbookmark(args) => {
            commands::content::handle_reaction(Reaction::Unbookmark, args, &ctx, &output).await
        }
        Commands::Friend(command) => commands::content::handle_friend(command, &ctx, &output).await,
        Commands::Comment(args) => commands::content::handle_comment(args, &ctx, &output).await,
        Commands::Watch(command) => commands::watch::handle_watch_commands(command, &ctx, &output).await,
        Commands::Demo => commands::demo::handle_demo(&output).await,
    }
}
