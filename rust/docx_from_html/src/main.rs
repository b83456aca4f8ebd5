use anyhow::{anyhow, Context, Result};
use clap::Parser;
use html_to_openxml::{ConverterOptions, Document, HtmlConverter};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input HTML file (a full document or a fragment).
    #[arg(long)]
    html_file: PathBuf,

    /// Output .docx path.
    #[arg(long)]
    out: PathBuf,

    /// Document title metadata (optional).
    #[arg(long)]
    title: Option<String>,

    /// Existing .docx to append to; its styles and numbering are reused.
    #[arg(long)]
    template: Option<PathBuf>,

    /// JSON file with converter options.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL for relative image sources (overrides the config file).
    #[arg(long)]
    base_url: Option<String>,

    /// Log every dropped tag and image.
    #[arg(short, long)]
    verbose: bool,
}

fn load_options(path: Option<&Path>) -> Result<ConverterOptions> {
    let Some(path) = path else {
        return Ok(ConverterOptions::default());
    };
    let json = fs::read_to_string(path).with_context(|| format!("open {}", path.display()))?;
    ConverterOptions::from_json(&json).with_context(|| format!("parse {}", path.display()))
}

fn run(args: &Args) -> Result<()> {
    let html = fs::read_to_string(&args.html_file)
        .with_context(|| format!("open {}", args.html_file.display()))?;
    if html.trim().is_empty() {
        return Err(anyhow!("{} is empty", args.html_file.display()));
    }

    let mut options = load_options(args.config.as_deref())?;
    if let Some(base) = &args.base_url {
        options.base_image_url = Some(base.clone());
    }

    let mut doc = match &args.template {
        Some(path) => Document::open(path).with_context(|| format!("open {}", path.display()))?,
        None => Document::new(),
    };
    if let Some(title) = &args.title {
        doc.set_title(title.as_str());
    }

    HtmlConverter::new(&mut doc)
        .with_options(options)
        .parse_html(&html);
    info!("{} blocks converted", doc.blocks().len());

    doc.save(&args.out)
        .with_context(|| format!("write {}", args.out.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    run(&args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(dir: &Path, html: &str) -> Args {
        let html_file = dir.join("in.html");
        fs::write(&html_file, html).unwrap();
        Args {
            html_file,
            out: dir.join("out/result.docx"),
            title: Some("Report".into()),
            template: None,
            config: None,
            base_url: None,
            verbose: false,
        }
    }

    #[test]
    fn test_writes_docx() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), "<html><body><h1>Title</h1><p>Body</p></body></html>");
        run(&args).unwrap();
        let doc = Document::open(&args.out).unwrap();
        let body = doc.body_xml();
        assert!(body.contains("Title"));
        assert!(body.contains("Body"));
    }

    #[test]
    fn test_appends_to_template() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = args(dir.path(), "<p>first</p>");
        run(&first).unwrap();

        let second_html = dir.path().join("second.html");
        fs::write(&second_html, "<p>second</p>").unwrap();
        first.template = Some(first.out.clone());
        first.html_file = second_html;
        first.out = dir.path().join("merged.docx");
        run(&first).unwrap();

        let body = Document::open(&first.out).unwrap().body_xml();
        assert!(body.find("first").unwrap() < body.find("second").unwrap());
    }

    #[test]
    fn test_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("options.json");
        fs::write(&config, r#"{"render-pre-as-table": true}"#).unwrap();
        let options = load_options(Some(&config)).unwrap();
        assert!(options.render_pre_as_table);

        fs::write(&config, "{not json").unwrap();
        assert!(load_options(Some(&config)).is_err());
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), "  \n");
        assert!(run(&args).is_err());
        assert!(!args.out.exists());
    }
}
