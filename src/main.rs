use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use docxide_layout::fonts::{FallbackMetrics, FontBook, TextMeasurer};
use docxide_layout::template::{find_template_variables, parse_assignments, substitute_variables};
use docxide_layout::{Error, LayoutOptions, layout_document, load_document, paint};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Blocks, measures and pages as JSON.
    Json,
    /// Absolutely positioned HTML pages.
    Html,
}

/// Lay out a DOCX (or JSON document tree) into pages.
#[derive(Parser, Debug)]
#[command(name = "docxide-layout", version, about)]
struct Cli {
    /// Input .docx, or a .json document tree
    input: PathBuf,

    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Gap between stacked pages, in points
    #[arg(long)]
    page_gap: Option<f32>,

    /// Template values as name=value; `{{name}}` occurrences are replaced
    #[arg(long = "vars", value_name = "NAME=VALUE", num_args = 1..)]
    vars: Vec<String>,

    /// Measure with built-in approximate metrics instead of system fonts
    #[arg(long)]
    fallback_metrics: bool,
}

fn run(cli: &Cli) -> Result<(), Error> {
    let mut doc = load_document(&cli.input)?;

    if !cli.vars.is_empty() {
        let values = parse_assignments(cli.vars.iter().map(String::as_str));
        let replaced = substitute_variables(&mut doc, &values);
        log::info!("substituted {} template variables", replaced);
    }

    let mut opts = LayoutOptions::default();
    if let Some(gap) = cli.page_gap {
        opts.page_gap = gap;
    }

    let font_book;
    let measurer: &dyn TextMeasurer = if cli.fallback_metrics {
        &FallbackMetrics
    } else {
        font_book = FontBook::new();
        &font_book
    };
    let result = layout_document(&doc, measurer, &opts);

    let unresolved = find_template_variables(&result.blocks);
    for var in &unresolved {
        log::debug!("unresolved template variable {} in {}", var.name, var.block_id);
    }

    let text = match cli.format {
        OutputFormat::Json => serde_json::to_string_pretty(&result)?,
        OutputFormat::Html => paint::paint_html(
            &result.layout,
            &result.blocks,
            &result.measures,
            &result.header_footers,
        ),
    };

    match &cli.output {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{}", text),
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
