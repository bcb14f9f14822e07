use std::cmp;
use std::error::Error;
use std::path::PathBuf;

use atty::Stream;
use clap::{Parser, Subcommand};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use urantia_study::{
    AppContext, GenerationOutcome, Match, Matcher, PREVIEW_LINES, SearchOptions, Settings,
    StudyReport,
};

#[derive(Parser, Debug)]
#[command(
    name = "urantia-study",
    about = "Search the Korean Urantia Book and draft theme reports",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding the corpus file (overrides URANTIA_DATA_DIR).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List corpus lines matching a keyword (regex, or literal if invalid).
    Search {
        keyword: String,
        /// Maximum number of matches to return.
        #[arg(short, long)]
        limit: Option<usize>,
        /// Match without regard to case.
        #[arg(short = 'i', long)]
        ignore_case: bool,
        /// Emphasise each occurrence of the keyword.
        #[arg(long)]
        highlight: bool,
    },
    /// Show the first lines of the loaded corpus.
    Preview {
        #[arg(short = 'n', long, default_value_t = PREVIEW_LINES)]
        lines: usize,
    },
    /// Generate a theological report and slide outline for a term.
    Generate { term: String },
    /// Run the web interface.
    #[cfg(feature = "web")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        #[arg(long, default_value = "tailwind")]
        theme: urantia_study::web::WebTheme,
        /// Public URL used in page metadata.
        #[arg(long)]
        base_url: Option<String>,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    let ctx = AppContext::initialize(settings)?;

    match cli.command {
        Command::Search {
            keyword,
            limit,
            ignore_case,
            highlight,
        } => handle_search(&ctx, keyword, limit, ignore_case, highlight, cli.json),
        Command::Preview { lines } => handle_preview(&ctx, lines, cli.json),
        Command::Generate { term } => handle_generate(&ctx, term, cli.json),
        #[cfg(feature = "web")]
        Command::Serve {
            addr,
            theme,
            base_url,
        } => {
            let config = urantia_study::web::WebConfig {
                addr,
                theme,
                base_url: base_url.unwrap_or_else(|| format!("http://{addr}")),
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(urantia_study::web::serve(std::sync::Arc::new(ctx), config))?;
            Ok(())
        }
    }
}

fn ensure_corpus(ctx: &AppContext) -> Result<(), Box<dyn Error>> {
    let status = ctx.corpus_status();
    if status.is_ready() {
        Ok(())
    } else {
        Err(status.to_string().into())
    }
}

fn handle_search(
    ctx: &AppContext,
    keyword: String,
    limit: Option<usize>,
    ignore_case: bool,
    highlight: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    ensure_corpus(ctx)?;
    let mut options: SearchOptions = ctx.settings().search_options();
    if let Some(limit) = limit {
        options.limit = cmp::max(1, limit);
    }
    options.case_insensitive = ignore_case;
    options.highlight = highlight && as_json;
    let matches = ctx.search(&keyword, &options);

    if as_json {
        let payload = json!({
            "keyword": keyword,
            "limit": options.limit,
            "case_insensitive": ignore_case,
            "results": matches,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let matcher = highlight
            .then(|| Matcher::compile(&keyword, ignore_case))
            .flatten();
        print_matches(&keyword, &matches, matcher.as_ref());
    }
    Ok(())
}

fn handle_preview(ctx: &AppContext, lines: usize, as_json: bool) -> Result<(), Box<dyn Error>> {
    ensure_corpus(ctx)?;
    let preview = ctx.corpus().preview(lines);
    if as_json {
        let payload = json!({
            "status": ctx.corpus_status().to_string(),
            "encoding": ctx.corpus().encoding().map(|e| e.label()),
            "lines": preview,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", ctx.corpus_status());
        for (idx, line) in preview.iter().enumerate() {
            println!("{:>5}  {}", idx + 1, line);
        }
    }
    Ok(())
}

fn handle_generate(ctx: &AppContext, term: String, as_json: bool) -> Result<(), Box<dyn Error>> {
    if term.trim().is_empty() {
        return Err("Term cannot be empty".into());
    }
    ensure_corpus(ctx)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(ctx.generate_report(&term));

    if as_json {
        let payload = json!({
            "term": report.term,
            "model": ctx.generator().model(),
            "passages": report.passages,
            "outcome": report.outcome,
            "artifact": report.artifact(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    print_report(&report)
}

fn print_matches(keyword: &str, rows: &[Match], matcher: Option<&Matcher>) {
    if rows.is_empty() {
        println!("No passages matched \"{keyword}\".");
        return;
    }
    let width = rows
        .last()
        .map(|m| m.line_number.to_string().len())
        .unwrap_or(4)
        .max("LINE".len());
    println!("Matches for \"{keyword}\" ({}):", rows.len());
    println!("{:>width$}  {:<9}  {}", "LINE", "REF", "TEXT", width = width);
    println!("{:->width$}  {:-<9}  {}", "", "", "----", width = width);
    let skin = stdout_is_tty().then(markdown_skin);
    for row in rows {
        let reference = row.reference.as_deref().unwrap_or("-");
        let text = match (matcher, &skin) {
            (Some(matcher), Some(skin)) => skin
                .inline(&matcher.highlight_escaped(&row.text, "**", "**", escape_inline_markdown))
                .to_string(),
            (Some(matcher), None) => matcher.highlight_plain(&row.text, "[", "]"),
            (None, _) => row.text.clone(),
        };
        println!(
            "{:>width$}  {:<9}  {}",
            row.line_number,
            reference,
            text,
            width = width
        );
    }
}

fn print_report(report: &StudyReport) -> Result<(), Box<dyn Error>> {
    println!(
        "Term: {} ({} passage{})",
        report.term,
        report.passages.len(),
        if report.passages.len() == 1 { "" } else { "s" }
    );
    match &report.outcome {
        GenerationOutcome::Generated(text) => {
            render_markdown_block("Report", text);
            if let Some(artifact) = report.artifact() {
                if !artifact.is_complete() {
                    eprintln!(
                        "note: expected 5 slides, model returned {}",
                        artifact.slides.len()
                    );
                }
            }
            Ok(())
        }
        GenerationOutcome::Failed(message) => Err(message.clone().into()),
    }
}

/// Backslash-escapes the characters termimad treats as inline markup.
fn escape_inline_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '*' | '~' | '`' | '|') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = markdown_skin();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_markdown_is_escaped() {
        assert_eq!(escape_inline_markdown("a*b_c `d` ~e~ |f\\"), "a\\*b_c \\`d\\` \\~e\\~ \\|f\\\\");
        assert_eq!(escape_inline_markdown("신앙의 도약"), "신앙의 도약");
    }

    #[test]
    fn highlighted_row_keeps_source_stars_literal() {
        let matcher = Matcher::compile("grace", false).unwrap();
        let marked = matcher.highlight_escaped("**note** grace", "**", "**", escape_inline_markdown);
        assert_eq!(marked, "\\*\\*note\\*\\* **grace**");
        let parsed = termimad::minimad::Composite::from_inline(&marked);
        let text: String = parsed.compounds.iter().map(|c| c.src).collect();
        let bold: Vec<&str> = parsed
            .compounds
            .iter()
            .filter(|c| c.bold)
            .map(|c| c.src)
            .collect();
        assert_eq!(text, "**note** grace");
        assert_eq!(bold, vec!["grace"]);
    }
}
