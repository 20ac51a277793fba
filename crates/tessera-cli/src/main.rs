//! Tessera - render tenant templates from the command line
//!
//! # Usage
//!
//! ```bash
//! # Render app/home.html for a tenant with page data
//! tessera render --sites sites.yaml --host example.com --template app/home.html --data page.json
//!
//! # Render a standalone file with no site configuration
//! tessera render --file draft.html --data page.yaml --format json
//!
//! # Validate a site file and list its tenants
//! tessera sites sites.yaml
//! ```
//!
//! Log verbosity follows `-v` (debug) / `-vv` (trace), or `TESSERA_LOG`.

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tessera_core::value::map_from_json;
use tessera_core::{Map, TESSERA_VERSION};
use tessera_render::{Document, Engine, RequestHint, RequestInfo, SiteConfig, SiteRegistry, TemplateLoader};
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(version = TESSERA_VERSION)]
#[command(about = "Render multi-tenant site templates", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one template and print the assembled document
    Render {
        /// Site configuration file (YAML)
        #[arg(long)]
        sites: Option<PathBuf>,

        /// Host the request is made for
        #[arg(long, default_value = "")]
        host: String,

        /// Logical template name inside the host's template tree
        #[arg(long, conflicts_with = "file")]
        template: Option<String>,

        /// Template file read directly from disk
        #[arg(long)]
        file: Option<PathBuf>,

        /// Render data (JSON, or YAML for .yaml/.yml)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "html")]
        format: OutputFormat,

        /// Exit non-zero when the render produced diagnostics
        #[arg(long)]
        strict: bool,
    },

    /// Validate a site file and list its tenants
    Sites {
        /// Site configuration file (YAML)
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Page skeleton with head, body and pre-footer tags
    Html,
    /// The document record as JSON
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Render {
            sites,
            host,
            template,
            file,
            data,
            format,
            strict,
        } => render(RenderArgs {
            sites,
            host,
            template,
            file,
            data,
            format,
            strict,
        }),
        Commands::Sites { file } => list_sites(&file),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            process::exit(2);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => std::env::var("TESSERA_LOG")
            .ok()
            .and_then(|value| value.parse::<Level>().ok())
            .unwrap_or(Level::WARN),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

struct RenderArgs {
    sites: Option<PathBuf>,
    host: String,
    template: Option<String>,
    file: Option<PathBuf>,
    data: Option<PathBuf>,
    format: OutputFormat,
    strict: bool,
}

fn render(args: RenderArgs) -> Result<i32> {
    let (engine, registry) = match &args.sites {
        Some(path) => {
            let config = SiteConfig::load(path)?;
            let registry = Arc::new(SiteRegistry::from_config(&config));
            let engine = Engine::standard()
                .with_options(config.engine.clone())
                .with_sites(Arc::clone(&registry));
            (Arc::new(engine), Some(registry))
        }
        None => (Arc::new(Engine::standard()), None),
    };

    let source = match (&args.template, &args.file) {
        (Some(name), _) => {
            let Some(registry) = &registry else {
                bail!("--template needs --sites to locate the template tree");
            };
            registry
                .load(name, &args.host)
                .with_context(|| format!("loading template '{}' for host '{}'", name, args.host))?
        }
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading template file {}", path.display()))?,
        (None, None) => bail!("one of --template or --file is required"),
    };

    let data = match &args.data {
        Some(path) => read_data(path)?,
        None => Map::new(),
    };
    debug!(keys = data.len(), host = %args.host, "rendering");

    let request: Arc<dyn RequestHint> = Arc::new(RequestInfo::new(args.host.clone()));
    let document = Engine::render_document(&engine, &source, data, Some(request));

    match args.format {
        OutputFormat::Html => println!("{}", page(&document)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&document)?),
    }
    for diagnostic in &document.diagnostics {
        eprintln!("warning: {}", diagnostic);
    }

    Ok(if args.strict && !document.diagnostics.is_empty() { 1 } else { 0 })
}

fn read_data(path: &Path) -> Result<Map> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading data file {}", path.display()))?;
    let is_yaml = matches!(path.extension().and_then(|ext| ext.to_str()), Some("yaml" | "yml"));

    let value: serde_json::Value = if is_yaml {
        serde_yaml::from_str(&text).with_context(|| format!("parsing YAML data in {}", path.display()))?
    } else {
        serde_json::from_str(&text).with_context(|| format!("parsing JSON data in {}", path.display()))?
    };
    if !value.is_object() {
        bail!("data file {} must hold a mapping at the top level", path.display());
    }
    Ok(map_from_json(value))
}

fn page(document: &Document) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n{}\n</head>\n<body>\n{}\n{}\n</body>\n</html>",
        document.render_head(),
        document.body,
        document.render_pre_footer()
    )
}

fn list_sites(path: &Path) -> Result<i32> {
    let config = SiteConfig::load(path)?;
    let registry = SiteRegistry::from_config(&config);
    for site in registry.sites() {
        println!("{}\t{}", site.host, site.template_dir.display());
    }
    println!(
        "{} site(s), max_depth={}, scripts default to {}",
        registry.sites().len(),
        config.engine.max_depth,
        config.engine.default_script_location
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Value;

    #[test]
    fn test_read_data_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("page.json");
        let yaml_path = dir.path().join("page.yml");
        std::fs::write(&json_path, r#"{ "title": "Home", "tags": ["a"] }"#).unwrap();
        std::fs::write(&yaml_path, "title: Home\ntags: [a]\n").unwrap();

        let from_json = read_data(&json_path).unwrap();
        let from_yaml = read_data(&yaml_path).unwrap();
        assert_eq!(from_json.get("title"), Some(&Value::from("Home")));
        assert_eq!(from_json, from_yaml);
    }

    #[test]
    fn test_read_data_rejects_non_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(read_data(&path).is_err());
    }

    #[test]
    fn test_cli_parses_render() {
        let cli = Cli::try_parse_from([
            "tessera", "-vv", "render", "--file", "page.html", "--host", "a.test", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Render { format: OutputFormat::Json, ref host, .. } if host == "a.test"
        ));
    }
}
