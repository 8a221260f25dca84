use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::info;
use report_form::template::check_template;
use report_form::{
    DataUriDownload, DirectoryDownload, OverflowPolicy, RenderedReport, ReportRecord,
    ReportRenderer, SampleTemplate, TemplateFile, TemplateSource, FORM_FIELD_MAP_VERSION,
};

/// Renders parent-meeting reports into flattened PDF forms.
///
/// The template is taken from `--template`, the `REPORT_FORM_TEMPLATE`
/// environment variable, or `assets/rendez-vous-de-parents.pdf` next to the
/// executable or the `report_form` crate.
#[derive(Parser)]
#[command(author, version, about = "Fill and flatten parent-meeting report forms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a report read as JSON from a file or stdin.
    Render(RenderArgs),

    /// Check that a template carries every field the renderer fills.
    #[command(name = "check-template", aliases = ["check_template", "check"])]
    CheckTemplate {
        /// Template PDF to check.
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Write a blank fillable form compatible with the renderer.
    #[command(name = "sample-template", aliases = ["sample_template", "sample"])]
    SampleTemplate {
        /// Where to write the PDF.
        #[arg(long, short, default_value = "rendez-vous-de-parents.pdf")]
        output: PathBuf,
    },

    /// List students known to the report service.
    #[cfg(feature = "remote")]
    Students {
        /// Only show students whose name contains this text.
        #[arg(long)]
        search: Option<String>,
    },

    /// List the school years with reports for a student.
    #[cfg(feature = "remote")]
    Years { full_name: String },

    /// Download every report of a school year as one PDF.
    #[cfg(feature = "remote")]
    Bundle {
        full_name: String,
        from: i32,
        to: i32,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Delete a student and their reports.
    #[cfg(feature = "remote")]
    #[command(name = "delete-student", aliases = ["delete_student"])]
    DeleteStudent { full_name: String },
}

#[derive(Args)]
struct RenderArgs {
    /// Report JSON file; reads stdin when omitted or `-`.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Template PDF to fill.
    #[arg(long)]
    template: Option<PathBuf>,

    /// Directory the PDF is written to.
    #[arg(long, default_value = ".", conflicts_with = "data_uri")]
    out_dir: PathBuf,

    /// Print a data URI on stdout instead of writing a file.
    #[arg(long)]
    data_uri: bool,

    /// Join unrecognized attendees with this separator instead of keeping the last one.
    #[arg(long, value_name = "SEPARATOR")]
    join_overflow: Option<String>,

    /// Render even when the report fails validation.
    #[arg(long)]
    skip_validation: bool,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(err) = run(cli.command).await {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Render(args) => render(args).await,
        Commands::CheckTemplate { template } => check(template).await,
        Commands::SampleTemplate { output } => {
            let bytes = SampleTemplate::new().build()?;
            fs::write(&output, bytes)?;
            info!("Wrote sample template to {}", output.display());
            Ok(())
        }
        #[cfg(feature = "remote")]
        Commands::Students { search } => remote::students(search.as_deref()).await,
        #[cfg(feature = "remote")]
        Commands::Years { full_name } => remote::years(&full_name).await,
        #[cfg(feature = "remote")]
        Commands::Bundle {
            full_name,
            from,
            to,
            out_dir,
        } => remote::bundle(&full_name, from, to, out_dir).await,
        #[cfg(feature = "remote")]
        Commands::DeleteStudent { full_name } => remote::delete_student(&full_name).await,
    }
}

fn template_file(path: Option<PathBuf>) -> Result<TemplateFile, Box<dyn Error>> {
    match path {
        Some(path) => Ok(TemplateFile::new(path)),
        None => Ok(TemplateFile::locate()?),
    }
}

fn read_report(path: Option<&PathBuf>) -> Result<ReportRecord, Box<dyn Error>> {
    let json = match path {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path)?,
        _ => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    Ok(ReportRecord::from_json(&json)?)
}

async fn render(args: RenderArgs) -> Result<(), Box<dyn Error>> {
    let report = read_report(args.report.as_ref())?;
    if !args.skip_validation {
        report.validate()?;
    }

    let policy = match args.join_overflow {
        Some(separator) => OverflowPolicy::Join(separator),
        None => OverflowPolicy::LastWins,
    };
    let renderer = ReportRenderer::builder(template_file(args.template)?)
        .with_overflow_policy(policy)
        .build();
    let rendered: RenderedReport = renderer.render(&report).await?;

    if args.data_uri {
        rendered.deliver(&mut DataUriDownload::new(io::stdout().lock()))?;
    } else {
        rendered.deliver(&mut DirectoryDownload::new(args.out_dir))?;
    }
    Ok(())
}

async fn check(template: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let source = template_file(template)?;
    let bytes = source.load().await?;
    let problems = check_template(&bytes)?;
    if problems.is_empty() {
        println!(
            "{} matches field map {}",
            source.describe(),
            FORM_FIELD_MAP_VERSION
        );
        return Ok(());
    }
    for problem in &problems {
        println!("  {}", problem);
    }
    Err(format!(
        "{} has {} field(s) that do not match field map {}",
        source.describe(),
        problems.len(),
        FORM_FIELD_MAP_VERSION
    )
    .into())
}

#[cfg(feature = "remote")]
mod remote {
    use std::error::Error;
    use std::path::PathBuf;
    use std::time::SystemTime;

    use report_form::api::{
        filter_students, ApiClient, SchoolYear, Session, SessionContext, REFRESH_INTERVAL,
    };
    use report_form::DirectoryDownload;

    const TOKEN_ENV_VAR: &str = "REPORT_FORM_TOKEN";

    fn client() -> Result<ApiClient, Box<dyn Error>> {
        let token = std::env::var(TOKEN_ENV_VAR)
            .map_err(|_| format!("{TOKEN_ENV_VAR} must hold a bearer token"))?;
        let session = Session::new(token, SystemTime::now() + REFRESH_INTERVAL);
        Ok(ApiClient::from_env(SessionContext::new(session))?)
    }

    pub async fn students(search: Option<&str>) -> Result<(), Box<dyn Error>> {
        let students = client()?.students().await?;
        for student in filter_students(&students, search.unwrap_or_default()) {
            println!("{}", student.full_name);
        }
        Ok(())
    }

    pub async fn years(full_name: &str) -> Result<(), Box<dyn Error>> {
        let years = client()?.years(full_name).await?;
        if years.is_empty() {
            println!("No reports for {full_name}");
        }
        for year in years {
            println!("{}", year.label());
        }
        Ok(())
    }

    pub async fn bundle(
        full_name: &str,
        from: i32,
        to: i32,
        out_dir: PathBuf,
    ) -> Result<(), Box<dyn Error>> {
        let bundle = client()?
            .report_bundle(full_name, SchoolYear { from, to })
            .await?;
        bundle.deliver(&mut DirectoryDownload::new(out_dir))?;
        Ok(())
    }

    pub async fn delete_student(full_name: &str) -> Result<(), Box<dyn Error>> {
        client()?.delete_student(full_name).await?;
        println!("Deleted {full_name}");
        Ok(())
    }
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
