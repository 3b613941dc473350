use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "manga-localizer",
    version,
    about = "Replace the text in manga pages, or caption a video, in another language"
)]
struct Cli {
    /// Operation: translate, both (translate + colorize) or subtitle
    #[arg(short = 'o', long = "operation", default_value = "translate")]
    operation: String,

    /// Input files (images, or one video for subtitle)
    #[arg(short = 'd', long = "data", num_args = 1..)]
    data: Vec<String>,

    /// Source language (ISO 639-1). Use "auto" to detect.
    #[arg(short = 'L', long = "source-lang", default_value = "auto")]
    source_lang: String,

    /// Target language (default: en)
    #[arg(short = 'l', long = "lang", default_value = "en")]
    lang: String,

    /// Stop after scanning and print review items as JSON
    #[arg(long = "review", conflicts_with = "submit_review")]
    review: bool,

    /// Render a reviewed operation by id
    #[arg(long = "submit-review", value_name = "ID")]
    submit_review: Option<String>,

    /// JSON array of {index, text} edits for --submit-review ("-" reads stdin)
    #[arg(long = "modifications", value_name = "FILE", requires = "submit_review")]
    modifications: Option<String>,

    /// Directory for rendered outputs (default: current directory)
    #[arg(long = "out-dir")]
    out_dir: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Show installed tesseract languages and exit
    #[arg(long = "show-ocr-languages")]
    show_ocr_languages: bool,

    /// Output OCR debug overlays for each page
    #[arg(long = "debug-ocr")]
    debug_ocr: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Whisper model name or path (subtitle transcription)
    #[arg(long = "whisper-model")]
    whisper_model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    manga_localizer::logging::init(cli.verbose)?;

    let output = manga_localizer::run(manga_localizer::Config {
        operation: cli.operation,
        data: cli.data,
        source_lang: cli.source_lang,
        lang: cli.lang,
        review: cli.review,
        submit_review: cli.submit_review,
        modifications: cli.modifications,
        out_dir: cli.out_dir,
        settings_path: cli.read_settings,
        show_ocr_languages: cli.show_ocr_languages,
        debug_ocr: cli.debug_ocr,
        whisper_model: cli.whisper_model,
    })
    .await?;

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
