//! CLI for pricing customers and managing saved calculations.

use core::fmt::Display;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use laskuri_rs::laskuri::LaskuriBlocking;
use laskuri_rs::models::{
    CalculationId, CalculationType, Customer, InvoiceCalculationResult, SavedCalculation,
};
use laskuri_rs::storage::{BlockingStorage, FileStorage};
use owo_colors::OwoColorize;

/// Environment variable overriding the storage directory.
const DATA_DIR_ENV: &str = "LASKURI_DATA_DIR";

/// Invoice pricing for accounting-firm customers.
#[derive(Debug, Parser)]
#[command(name = "laskuri", version, about)]
struct Cli {
    /// Override the storage directory (default: $LASKURI_DATA_DIR, then the
    /// platform data dir).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// VAT rate as a fraction (e.g. 0.255). Default for quotes and new
    /// calculations; `recalculate` applies it instead of the stored rate.
    #[arg(long, global = true, value_name = "RATE")]
    vat: Option<f64>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Create the data files if they are missing.
    Init,
    /// Show the data directory, or move it with --set.
    Location {
        /// Existing directory to keep the data files in.
        #[arg(long, value_name = "DIR")]
        set: Option<PathBuf>,
    },
    /// List customers.
    Customers,
    /// Add a customer from a JSON file, replacing one with the same id.
    ImportCustomer {
        /// Path to a JSON customer record.
        file: PathBuf,
    },
    /// Price a customer now without saving anything.
    Quote {
        /// Customer id or name.
        customer: String,
    },
    /// List saved calculations.
    Calculations {
        /// Only calculations of this customer (id or name).
        #[arg(long)]
        customer: Option<String>,
    },
    /// Price a customer and save the result as a new calculation.
    Save(SaveArgs),
    /// Reprice a saved calculation from its snapshot.
    Recalculate {
        /// Calculation id.
        id: String,
    },
    /// Copy a saved calculation under a new id.
    Duplicate {
        /// Calculation id.
        id: String,
        /// Name of the copy (default: "<name> (Copy)").
        #[arg(long)]
        name: Option<String>,
    },
    /// Re-snapshot a saved calculation from the live customer and reprice.
    Refresh {
        /// Calculation id.
        id: String,
    },
    /// Relabel a saved calculation.
    SetKind {
        /// Calculation id.
        id: String,
        /// draft, offer, final or archived.
        #[arg(value_parser = parse_kind)]
        kind: CalculationType,
    },
    /// Delete a saved calculation.
    DeleteCalculation {
        /// Calculation id.
        id: String,
    },
    /// Delete a customer. Its saved calculations are kept.
    DeleteCustomer {
        /// Customer id or name.
        customer: String,
    },
    /// Recompute every customer's calculation index from the calculations.
    RebuildIndex,
}

/// Arguments for the `save` subcommand.
#[derive(Debug, Args)]
struct SaveArgs {
    /// Customer id or name.
    customer: String,
    /// Calculation name.
    #[arg(long)]
    name: String,
    /// Initial label.
    #[arg(long, default_value = "draft", value_parser = parse_kind)]
    kind: CalculationType,
    /// Free-text description.
    #[arg(long, default_value = "")]
    description: String,
    /// Free-text notes.
    #[arg(long, default_value = "")]
    notes: String,
}

/// Settings shared by all subcommands.
#[derive(Debug)]
struct Settings {
    /// Directory holding the storage preferences.
    prefs_dir: PathBuf,
    /// `--vat` as given.
    vat: Option<f64>,
}

/// Parses a calculation label for clap.
fn parse_kind(s: &str) -> Result<CalculationType, String> {
    s.parse::<CalculationType>().map_err(|err| err.to_string())
}

/// Picks the storage directory: flag, then environment, then platform
/// default.
fn resolve_prefs_dir(
    flag: Option<PathBuf>,
    env: Option<OsString>,
) -> laskuri_rs::error::Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    match env.filter(|value| !value.is_empty()) {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => FileStorage::default_dir(),
    }
}

/// Prints an error with context and returns a failure exit code.
fn fail<E: Display>(context: &str, err: E) -> io::Result<ExitCode> {
    writeln!(
        io::stderr().lock(),
        "{} {context}: {err}",
        "error:".red().bold()
    )?;
    Ok(ExitCode::FAILURE)
}

/// Runs `on_success` for an `Ok` result, or reports the error.
fn handle<T, F>(
    result: laskuri_rs::error::Result<T>,
    context: &str,
    on_success: F,
) -> io::Result<ExitCode>
where
    F: FnOnce(T) -> io::Result<()>,
{
    match result {
        Ok(value) => {
            on_success(value)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => fail(context, err),
    }
}

/// Runs the CLI, returning an appropriate exit code.
fn run() -> io::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let _dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let prefs_dir = match resolve_prefs_dir(cli.data_dir, std::env::var_os(DATA_DIR_ENV)) {
        Ok(dir) => dir,
        Err(err) => return fail("failed to locate storage", err),
    };

    let storage = match FileStorage::new(prefs_dir.clone()) {
        Ok(storage) => storage,
        Err(err) => return fail("failed to initialize storage", err),
    };

    let mut builder = LaskuriBlocking::builder().storage(storage);
    if let Some(rate) = cli.vat {
        builder = builder.default_vat_rate(rate);
    }
    let manager = match builder.build() {
        Ok(manager) => manager,
        Err(err) => return fail("failed to start", err),
    };

    let settings = Settings {
        prefs_dir,
        vat: cli.vat,
    };
    dispatch(&manager, cli.command, &settings)
}

/// Dispatches to the appropriate subcommand handler.
fn dispatch<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    command: Command,
    settings: &Settings,
) -> io::Result<ExitCode> {
    match command {
        Command::Init => handle(manager.init_storage(), "failed to initialize storage", |()| {
            writeln!(io::stdout().lock(), "{}", "Storage initialized.".green())
        }),
        Command::Location { set } => cmd_location(manager, set.as_deref(), &settings.prefs_dir),
        Command::Customers => handle(
            manager.customers(),
            "failed to read customers",
            |customers| print_customers_table(&customers),
        ),
        Command::ImportCustomer { file } => cmd_import_customer(manager, &file),
        Command::Quote { customer } => cmd_quote(manager, &customer),
        Command::Calculations { customer } => cmd_calculations(manager, customer.as_deref()),
        Command::Save(args) => cmd_save(manager, args),
        Command::Recalculate { id } => cmd_recalculate(manager, &id, settings.vat),
        Command::Duplicate { id, name } => cmd_duplicate(manager, &id, name.as_deref()),
        Command::Refresh { id } => cmd_refresh(manager, &id),
        Command::SetKind { id, kind } => cmd_set_kind(manager, &id, kind),
        Command::DeleteCalculation { id } => handle(
            manager.delete_calculation(&CalculationId::from(id)),
            "failed to delete calculation",
            |remaining| {
                writeln!(
                    io::stdout().lock(),
                    "{} {}",
                    "Done.".green(),
                    format_args!("({} calculations stored)", remaining.len()).dimmed()
                )
            },
        ),
        Command::DeleteCustomer { customer } => cmd_delete_customer(manager, &customer),
        Command::RebuildIndex => handle(
            manager.rebuild_calculation_index(),
            "failed to rebuild index",
            |customers| {
                writeln!(
                    io::stdout().lock(),
                    "{} {}",
                    "Calculation index rebuilt.".green(),
                    format_args!("({} customers)", customers.len()).dimmed()
                )
            },
        ),
    }
}

/// Resolves a named entity, printing an error on failure.
///
/// Returns `Ok(Some(value))` on success, `Ok(None)` if the entity was not
/// found or the lookup failed (error already printed), or `Err` on I/O
/// failure.
fn resolve_name<T, F>(label: &str, name: &str, lookup: F) -> io::Result<Option<T>>
where
    F: FnOnce(&str) -> laskuri_rs::error::Result<Option<T>>,
{
    match lookup(name) {
        Ok(Some(value)) => Ok(Some(value)),
        Ok(None) => {
            writeln!(
                io::stderr().lock(),
                "{} {label} not found: {name}",
                "error:".red().bold()
            )?;
            Ok(None)
        }
        Err(err) => {
            writeln!(
                io::stderr().lock(),
                "{} failed to look up {label}: {err}",
                "error:".red().bold()
            )?;
            Ok(None)
        }
    }
}

/// Looks up a customer by id or name.
fn resolve_customer<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    key: &str,
) -> io::Result<Option<Customer>> {
    resolve_name("customer", key, |k| manager.find_customer(k))
}

/// Looks up a saved calculation by id.
fn resolve_calculation<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    id: &str,
) -> io::Result<Option<SavedCalculation>> {
    resolve_name("calculation", id, |k| {
        manager.calculation(&CalculationId::from(k))
    })
}

/// Executes the `location` subcommand.
fn cmd_location<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    set: Option<&Path>,
    prefs_dir: &Path,
) -> io::Result<ExitCode> {
    if let Some(dir) = set {
        return handle(
            manager.set_storage_location(dir),
            "failed to set storage location",
            |()| {
                writeln!(
                    io::stdout().lock(),
                    "{} {}",
                    "Storage location set to".green(),
                    dir.display().bold()
                )
            },
        );
    }
    handle(
        manager.storage_location(),
        "failed to read storage location",
        |location| {
            let mut out = io::stdout().lock();
            match location {
                Some(custom) => writeln!(out, "{} {}", "Custom:".bold(), custom.display()),
                None => writeln!(out, "{} {}", "Default:".bold(), prefs_dir.display()),
            }
        },
    )
}

/// Parses a single JSON customer record.
fn parse_customer(raw: &str) -> laskuri_rs::error::Result<Customer> {
    Ok(serde_json::from_str(raw)?)
}

/// Executes the `import-customer` subcommand.
fn cmd_import_customer<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    file: &Path,
) -> io::Result<ExitCode> {
    let raw = match fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(err) => return fail(&format!("failed to read {}", file.display()), err),
    };
    let mut customer = match parse_customer(&raw) {
        Ok(customer) => customer,
        Err(err) => return fail("invalid customer record", err),
    };
    print_validation_warnings(&customer)?;

    let existing = match manager.customer(&customer.id) {
        Ok(existing) => existing,
        Err(err) => return fail("failed to read customers", err),
    };
    let result = match existing {
        Some(current) => {
            // Keep the index unless the file carries one.
            if customer.calculation_ids.is_none() {
                customer.calculation_ids = current.calculation_ids;
            }
            manager.update_customer(customer)
        }
        None => manager.add_customer(customer),
    };
    handle(result, "failed to save customer", |customers| {
        writeln!(
            io::stdout().lock(),
            "{} {}",
            "Customer saved.".green(),
            format_args!("({} customers)", customers.len()).dimmed()
        )
    })
}

/// Executes the `quote` subcommand.
fn cmd_quote<S: BlockingStorage>(manager: &LaskuriBlocking<S>, key: &str) -> io::Result<ExitCode> {
    let Some(customer) = resolve_customer(manager, key)? else {
        return Ok(ExitCode::FAILURE);
    };
    print_validation_warnings(&customer)?;
    let result = manager.calculate(&customer, None);
    print_invoice(&customer.name, &result)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `calculations` subcommand.
fn cmd_calculations<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    customer: Option<&str>,
) -> io::Result<ExitCode> {
    let result = match customer {
        Some(key) => {
            let Some(found) = resolve_customer(manager, key)? else {
                return Ok(ExitCode::FAILURE);
            };
            manager.calculations_for_customer(&found.id)
        }
        None => manager.calculations(),
    };
    handle(result, "failed to read calculations", |calcs| {
        print_calculations_table(&calcs)
    })
}

/// Executes the `save` subcommand.
fn cmd_save<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    args: SaveArgs,
) -> io::Result<ExitCode> {
    let Some(customer) = resolve_customer(manager, &args.customer)? else {
        return Ok(ExitCode::FAILURE);
    };
    let request = manager
        .new_calculation(args.name)
        .kind(args.kind)
        .description(args.description)
        .notes(args.notes);
    let calc = manager.create_saved_calculation(&customer, request);
    store_new(manager, calc, "Saved calculation")
}

/// Adds a fresh calculation and prints it.
fn store_new<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    calc: SavedCalculation,
    headline: &str,
) -> io::Result<ExitCode> {
    let title = format!("{headline} {} ({})", calc.id, calc.name);
    let result = calc.result;
    handle(
        manager.add_calculation(calc),
        "failed to save calculation",
        |_all| print_invoice(&title, &result),
    )
}

/// Replaces a stored calculation and prints it.
fn store_updated<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    calc: SavedCalculation,
) -> io::Result<ExitCode> {
    let title = format!("{} (version {})", calc.name, calc.version);
    let result = calc.result;
    handle(
        manager.update_calculation(calc),
        "failed to update calculation",
        |_all| print_invoice(&title, &result),
    )
}

/// Executes the `recalculate` subcommand.
fn cmd_recalculate<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    id: &str,
    vat: Option<f64>,
) -> io::Result<ExitCode> {
    let Some(calc) = resolve_calculation(manager, id)? else {
        return Ok(ExitCode::FAILURE);
    };
    store_updated(manager, manager.recalculate_invoice(&calc, vat))
}

/// Executes the `duplicate` subcommand.
fn cmd_duplicate<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    id: &str,
    name: Option<&str>,
) -> io::Result<ExitCode> {
    let Some(calc) = resolve_calculation(manager, id)? else {
        return Ok(ExitCode::FAILURE);
    };
    store_new(
        manager,
        manager.duplicate_calculation(&calc, name),
        "Duplicated as",
    )
}

/// Executes the `refresh` subcommand.
fn cmd_refresh<S: BlockingStorage>(manager: &LaskuriBlocking<S>, id: &str) -> io::Result<ExitCode> {
    let Some(calc) = resolve_calculation(manager, id)? else {
        return Ok(ExitCode::FAILURE);
    };
    let customer_key = calc.customer_id.as_inner().to_owned();
    let Some(customer) = resolve_name("customer", &customer_key, |_| {
        manager.customer(&calc.customer_id)
    })?
    else {
        return Ok(ExitCode::FAILURE);
    };
    store_updated(manager, manager.update_calculation_customer(&calc, &customer))
}

/// Executes the `set-kind` subcommand.
fn cmd_set_kind<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    id: &str,
    kind: CalculationType,
) -> io::Result<ExitCode> {
    let Some(calc) = resolve_calculation(manager, id)? else {
        return Ok(ExitCode::FAILURE);
    };
    store_updated(manager, manager.set_calculation_type(&calc, kind))
}

/// Executes the `delete-customer` subcommand.
fn cmd_delete_customer<S: BlockingStorage>(
    manager: &LaskuriBlocking<S>,
    key: &str,
) -> io::Result<ExitCode> {
    let Some(customer) = resolve_customer(manager, key)? else {
        return Ok(ExitCode::FAILURE);
    };
    handle(
        manager.delete_customer(&customer.id),
        "failed to delete customer",
        |remaining| {
            writeln!(
                io::stdout().lock(),
                "{} {}",
                format_args!("Deleted {}.", customer.name).green(),
                format_args!("({} customers left)", remaining.len()).dimmed()
            )
        },
    )
}

// ── Output formatting ────────────────────────────────────────────────

/// Formats a euro amount.
fn money(amount: f64) -> String {
    format!("{amount:.2} \u{20ac}")
}

/// Prints validation issues of `customer` as warnings.
fn print_validation_warnings(customer: &Customer) -> io::Result<()> {
    let mut err = io::stderr().lock();
    for issue in customer.validate() {
        writeln!(err, "{} {issue}", "warning:".yellow().bold())?;
    }
    Ok(())
}

/// Prints an itemized invoice.
fn print_invoice(title: &str, result: &InvoiceCalculationResult) -> io::Result<()> {
    let mut out = io::stdout().lock();

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Item").fg(Color::Cyan),
        Cell::new("Amount").fg(Color::Cyan),
    ]);

    let rows = [
        ("Average hours / month", format!("{:.2}", result.average_hours)),
        ("Hourly work", money(result.subtotals.hourly_work)),
        ("Accounting software", money(result.subtotals.accounting_software)),
        ("Salary payments", money(result.subtotals.salary_payments)),
        ("Subtotal", money(result.subtotals.total_subtotal)),
        ("Margin coefficient", format!("{:.1}", result.margin_coefficient)),
        ("Margin", money(result.margin_amount)),
        ("Year-end accounting", money(result.year_end_accounting_price)),
        ("Discount", money(result.discount_amount)),
        ("Additional fees", money(result.additional_fees)),
        ("Price without VAT", money(result.price_without_vat)),
    ];
    for (label, value) in rows {
        _ = table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    _ = table.add_row(vec![
        Cell::new(format!("VAT {:.1} %", result.vat_rate * 100.0)),
        Cell::new(money(result.vat_amount())),
    ]);
    _ = table.add_row(vec![
        Cell::new("Price with VAT").fg(Color::Green),
        Cell::new(money(result.price_with_vat)).fg(Color::Green),
    ]);
    _ = table.add_row(vec![
        Cell::new("Customer margin").fg(Color::DarkGrey),
        Cell::new(money(result.customer_margin)).fg(Color::DarkGrey),
    ]);

    writeln!(out, "{}", title.green().bold())?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Prints customers in a table.
fn print_customers_table(customers: &[Customer]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if customers.is_empty() {
        writeln!(out, "{}", "No customers found.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Id").fg(Color::Cyan),
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Type").fg(Color::Cyan),
        Cell::new("Hourly rate").fg(Color::Cyan),
        Cell::new("Employees").fg(Color::Cyan),
        Cell::new("Calculations").fg(Color::Cyan),
    ]);

    for customer in customers {
        let linked = customer.calculation_ids.as_ref().map_or(0, Vec::len);
        _ = table.add_row(vec![
            Cell::new(&customer.id),
            Cell::new(&customer.name),
            Cell::new(customer.company_type),
            Cell::new(money(customer.hourly_rate)),
            Cell::new(customer.number_of_employees),
            Cell::new(linked),
        ]);
    }

    writeln!(
        out,
        "{} {}",
        "Customers".green().bold(),
        format_args!("({})", customers.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Prints saved calculations in a table.
fn print_calculations_table(calcs: &[SavedCalculation]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if calcs.is_empty() {
        writeln!(out, "{}", "No calculations found.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Id").fg(Color::Cyan),
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Customer").fg(Color::Cyan),
        Cell::new("Type").fg(Color::Cyan),
        Cell::new("Version").fg(Color::Cyan),
        Cell::new("Modified").fg(Color::Cyan),
        Cell::new("With VAT").fg(Color::Cyan),
    ]);

    for calc in calcs {
        let kind_cell = match calc.kind {
            CalculationType::Final => Cell::new(calc.kind).fg(Color::Green),
            CalculationType::Archived => Cell::new(calc.kind).fg(Color::DarkGrey),
            CalculationType::Draft | CalculationType::Offer => Cell::new(calc.kind),
        };
        _ = table.add_row(vec![
            Cell::new(&calc.id),
            Cell::new(&calc.name),
            Cell::new(&calc.customer_snapshot.name),
            kind_cell,
            Cell::new(calc.version),
            Cell::new(calc.modified_at.format("%Y-%m-%d %H:%M")),
            Cell::new(money(calc.result.price_with_vat)),
        ]);
    }

    writeln!(
        out,
        "{} {}",
        "Calculations".green().bold(),
        format_args!("({})", calcs.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Entry point.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            // Last-resort error output; if stderr itself failed, nothing
            // we can do.
            let _ignored = writeln!(io::stderr(), "fatal I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}
