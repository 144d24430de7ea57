//! icasa CLI - Reconcile measurement data into ICASA template workbooks
//!
//! A template workbook is a directory of CSV sheets (three preamble rows,
//! then the header row), optionally ordered by a `workbook.json` manifest.
//!
//! # Main Commands
//!
//! ```bash
//! icasa reconcile -t template/ -s Plant_growth input.csv   # Merge an input sheet
//! icasa import -t template/ export.csv -c comment.txt      # Merge raw observations
//! ```
//!
//! # Helper Commands
//!
//! ```bash
//! icasa aggregate input.csv -g TRTNO -g DATE -V PHTD   # Aggregate a table
//! icasa locate -t template/ PHTD                        # Which sheet declares a variable
//! icasa sheets -t template/                             # List sheets
//! icasa glossary -t template/                           # Variable/unit glossary
//! icasa example-config                                  # Show example configuration
//! icasa validate-config config.json                     # Check a configuration
//! ```

use clap::{Parser, Subcommand};
use icasa::{
    aggregate, build_glossary, enrich_glossary, import_observations, locate_table, parse_file_auto,
    parse_variable_comment, reconcile_table, validate_reconcile_config, write_file, write_file_preserving, AggregateSpec,
    AggregationFunction, KeyFields, ObservationColumns, ReconcileConfig, TemplateWorkbook, VariableMetadata,
    VariableOutcome, CONFIG_ENV_VAR,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "icasa")]
#[command(about = "Reconcile measurement data into ICASA template workbooks", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge an input sheet into one template sheet
    Reconcile {
        /// Input CSV (header on the first row)
        input: PathBuf,

        /// Template workbook directory
        #[arg(short, long)]
        template: PathBuf,

        /// Target sheet
        #[arg(short, long)]
        sheet: String,

        /// Configuration JSON (default: $ICASA_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Let new values replace stored ones
        #[arg(long)]
        overwrite: bool,

        /// Write the merged sheet here instead of updating the workbook
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge raw observations (time, value, site, level) into the workbook
    Import {
        /// Observation export CSV
        input: PathBuf,

        /// Template workbook directory
        #[arg(short, long)]
        template: PathBuf,

        /// File holding the value-type comment with `ICASA:` lines
        #[arg(short = 'm', long)]
        comment: Option<PathBuf>,

        /// Variable as `NAME[*factor][, aggregation]`, repeatable
        #[arg(long = "variable")]
        variables: Vec<String>,

        /// Configuration JSON (default: $ICASA_CONFIG, else observation key columns)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Let new values replace stored ones
        #[arg(long)]
        overwrite: bool,

        /// Report only, do not write sheets
        #[arg(long)]
        dry_run: bool,
    },

    /// Aggregate a table and print it as CSV
    Aggregate {
        /// Input CSV (header on the first row)
        input: PathBuf,

        /// Grouping field, repeatable
        #[arg(short, long = "group", required = true)]
        group: Vec<String>,

        /// Value field, repeatable
        #[arg(short = 'V', long = "value", required = true)]
        values: Vec<String>,

        /// mean, sum, min or max
        #[arg(short, long, default_value = "mean")]
        function: AggregationFunction,

        /// Time-of-day field to keep
        #[arg(long)]
        time: Option<String>,

        /// Add number_of_samples
        #[arg(long)]
        count: bool,

        /// Add <field>_stdev columns
        #[arg(long)]
        stdev: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Find the sheet declaring a variable
    Locate {
        /// Variable name
        variable: String,

        /// Template workbook directory
        #[arg(short, long)]
        template: PathBuf,
    },

    /// List the sheets of a workbook in declared order
    Sheets {
        /// Template workbook directory
        #[arg(short, long)]
        template: PathBuf,
    },

    /// Build the variable glossary of a workbook
    Glossary {
        /// Template workbook directory
        #[arg(short, long)]
        template: PathBuf,

        /// Reference glossary CSV to enrich from
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Variable column of the reference glossary
        #[arg(long, default_value = "Variable_Name")]
        var_col: String,

        /// Reference columns to append
        #[arg(long = "extra", default_values_t = [String::from("Code_Query"), String::from("Description")])]
        extra: Vec<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show example configuration
    ExampleConfig,

    /// Validate a configuration file
    ValidateConfig {
        /// Configuration JSON
        input: PathBuf,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Reconcile {
            input,
            template,
            sheet,
            config,
            overwrite,
            output,
        } => cmd_reconcile(&input, &template, &sheet, config.as_deref(), overwrite, output.as_deref()),

        Commands::Import {
            input,
            template,
            comment,
            variables,
            config,
            overwrite,
            dry_run,
        } => cmd_import(
            &input,
            &template,
            comment.as_deref(),
            &variables,
            config.as_deref(),
            overwrite,
            dry_run,
        ),

        Commands::Aggregate {
            input,
            group,
            values,
            function,
            time,
            count,
            stdev,
            output,
        } => {
            let spec = AggregateSpec {
                group_fields: group,
                time_field: time,
                value_fields: values,
                function,
                time_function: None,
                with_count: count,
                with_stdev: stdev,
            };
            cmd_aggregate(&input, &spec, output.as_deref())
        }

        Commands::Locate { variable, template } => cmd_locate(&variable, &template),

        Commands::Sheets { template } => cmd_sheets(&template),

        Commands::Glossary {
            template,
            reference,
            var_col,
            extra,
            output,
        } => cmd_glossary(&template, reference.as_deref(), &var_col, &extra, output.as_deref()),

        Commands::ExampleConfig => cmd_example_config(),

        Commands::ValidateConfig { input } => cmd_validate_config(&input),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// Explicit path, then `$ICASA_CONFIG`, then `fallback`.
fn load_config(path: Option<&Path>, fallback: ReconcileConfig) -> Result<ReconcileConfig, Box<dyn std::error::Error>> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
    match path {
        Some(p) => {
            eprintln!("⚙️  Configuration: {}", p.display());
            Ok(ReconcileConfig::from_file(&p)?)
        }
        None => Ok(fallback),
    }
}

fn cmd_reconcile(
    input: &Path,
    template: &Path,
    sheet_name: &str,
    config_path: Option<&Path>,
    overwrite: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Reconciling: {} → {}", input.display(), sheet_name);

    let mut config = load_config(config_path, ReconcileConfig::default())?;
    config.overwrite |= overwrite;

    let parsed = parse_file_auto(input, 0)?;
    eprintln!("   Encoding: {}", parsed.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(parsed.delimiter));
    eprintln!("   Rows: {}", parsed.table.len());

    let mut workbook = TemplateWorkbook::load(template)?;
    let sheet = workbook
        .sheet(sheet_name)
        .ok_or_else(|| icasa::PipelineError::UnknownSheet(sheet_name.to_string()))?;

    let report = reconcile_table(&parsed.table, &sheet.table, &config)?;
    for field in &report.dropped_fields {
        eprintln!("   ⚠️  Skipped field: {}", field);
    }
    eprintln!("\n⚙️  {}", report.summary());

    match output {
        Some(path) => {
            write_file_preserving(path, &sheet.preamble, &report.table, &sheet.source, sheet.delimiter)?;
            eprintln!("   💾 Saved to: {}", path.display());
        }
        None => {
            workbook.replace_table(sheet_name, report.table)?;
            workbook.save_sheet(sheet_name)?;
            eprintln!("   💾 Sheet '{}' updated", sheet_name);
        }
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_import(
    input: &Path,
    template: &Path,
    comment: Option<&Path>,
    variable_specs: &[String],
    config_path: Option<&Path>,
    overwrite: bool,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Importing observations: {}", input.display());

    let fallback = ReconcileConfig {
        key_fields: KeyFields::observation_defaults(),
        ..ReconcileConfig::default()
    };
    let mut config = load_config(config_path, fallback)?;
    config.overwrite |= overwrite;

    let mut text = match comment {
        Some(path) => fs::read_to_string(path)?,
        None => String::new(),
    };
    for spec in variable_specs {
        text.push_str(&format!("\nICASA: {}", spec));
    }

    let mut variables: Vec<VariableMetadata> = Vec::new();
    for parsed in parse_variable_comment(&text) {
        match parsed {
            Ok(v) => variables.push(v),
            Err(e) => eprintln!("   ⚠️  {}", e),
        }
    }
    if variables.is_empty() {
        return Err("no ICASA variables given (use --comment or --variable)".into());
    }
    eprintln!("   Variables: {}", variables.iter().map(|v| v.name.as_str()).collect::<Vec<_>>().join(", "));

    let raw = parse_file_auto(input, 0)?;
    eprintln!("   Rows: {}", raw.table.len());

    let mut workbook = TemplateWorkbook::load(template)?;
    let report = import_observations(
        &raw.table,
        &variables,
        &ObservationColumns::default(),
        &mut workbook,
        &config,
    );

    eprintln!();
    for v in &report.variables {
        match &v.outcome {
            VariableOutcome::Merged { sheet, stats } => eprintln!(
                "   ✅ {} → {} (+{} rows, {} filled, {} overwritten)",
                v.variable, sheet, stats.inserted, stats.filled, stats.overwritten
            ),
            VariableOutcome::Skipped { reason } => eprintln!("   ⚠️  {}: {}", v.variable, reason),
            VariableOutcome::Failed { error } => eprintln!("   ❌ {}: {}", v.variable, error),
        }
    }
    eprintln!("\n📊 {}", report.summary());

    if dry_run {
        eprintln!("   Dry run, no sheet written");
    } else {
        for sheet in report.touched_sheets() {
            workbook.save_sheet(sheet)?;
            eprintln!("   💾 Sheet '{}' updated", sheet);
        }
    }

    if report.failed_count() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_aggregate(input: &Path, spec: &AggregateSpec, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📦 Aggregating: {}", input.display());

    let parsed = parse_file_auto(input, 0)?;
    let table = aggregate(&parsed.table, spec)?;
    eprintln!("   {} rows → {} groups", parsed.table.len(), table.len());

    match output {
        Some(path) => {
            write_file(path, &[], &table, parsed.delimiter)?;
            eprintln!("💾 Output written to: {}", path.display());
        }
        None => {
            let content = icasa::parser::table_to_string(&[], &table, parsed.delimiter)?;
            print!("{}", content);
        }
    }
    Ok(())
}

fn cmd_locate(variable: &str, template: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let workbook = TemplateWorkbook::load(template)?;
    let sheet = locate_table(variable, &workbook.headers())?;
    println!("{}", sheet);
    Ok(())
}

fn cmd_sheets(template: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let workbook = TemplateWorkbook::load(template)?;
    for name in workbook.sheet_names() {
        println!("{}", name);
    }
    Ok(())
}

fn cmd_glossary(
    template: &Path,
    reference: Option<&Path>,
    var_col: &str,
    extra: &[String],
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let workbook = TemplateWorkbook::load(template)?;
    let mut glossary = build_glossary(&workbook);
    eprintln!("📋 {} variables in {} sheets", glossary.len(), workbook.sheets().len());

    if let Some(path) = reference {
        let reference = parse_file_auto(path, 0)?;
        glossary = enrich_glossary(glossary, &reference.table, var_col, extra)?;
        eprintln!("   Enriched with: {}", extra.join(", "));
    }

    match output {
        Some(path) => {
            write_file(path, &[], &glossary, ';')?;
            eprintln!("💾 Output written to: {}", path.display());
        }
        None => print!("{}", icasa::parser::table_to_string(&[], &glossary, ';')?),
    }
    Ok(())
}

fn cmd_example_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = icasa::example_config();
    println!("{}", config.to_json()?);
    Ok(())
}

fn cmd_validate_config(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let content = fs::read_to_string(input)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;

    match validate_reconcile_config(&value) {
        Ok(()) => {
            eprintln!("✅ Configuration valid");
            Ok(())
        }
        Err(errors) => {
            for err in &errors {
                eprintln!("   - {}", err);
            }
            Err(format!("{} validation errors", errors.len()).into())
        }
    }
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}
