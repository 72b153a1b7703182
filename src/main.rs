use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use relmodel::{
    Catalog, Condition, Config, ModelProgram, Query, SqlCompiler, get_adapter, schema,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "relmodel")]
#[command(about = "Compile model definitions and queries to SQL")]
struct Cli {
    /// Driver whose SQL dialect is rendered.
    #[arg(long, global = true, default_value = "postgres")]
    driver: String,

    /// JSON configuration file; its database driver overrides --driver.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the CREATE TABLE statements of a model file.
    Schema { models: PathBuf },
    /// Print the compiled SELECT (or COUNT) of a query.
    Select {
        models: PathBuf,
        #[arg(long)]
        model: String,
        /// Comma-separated field paths, e.g. `name,manager.name`.
        #[arg(long)]
        fields: Option<String>,
        /// SQL-like boolean expression, e.g. `age > 30 AND NOT name LIKE 'A%'`.
        #[arg(long)]
        filter: Option<String>,
        /// `field` or `field asc|desc`; may be repeated.
        #[arg(long)]
        order: Vec<String>,
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        count: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let driver = match &cli.config {
        Some(path) => {
            Config::from_file(path)
                .with_context(|| format!("Failed to load configuration '{}'", path.display()))?
                .database
                .driver
        }
        None => cli.driver.clone(),
    };

    match cli.command {
        Command::Schema { models } => print_schema(&driver, &models),
        Command::Select {
            models,
            model,
            fields,
            filter,
            order,
            limit,
            offset,
            count,
        } => {
            let mut query = Query::new(model).limit(limit).offset(offset);
            if let Some(fields) = fields {
                query = query.fields(fields.split(',').map(str::trim).filter(|f| !f.is_empty()));
            }
            if let Some(filter) = filter {
                let cond = Condition::parse(&filter)
                    .with_context(|| format!("Invalid filter '{}'", filter))?;
                query = query.filter(cond);
            }
            for o in &order {
                query = query.order_by(o);
            }
            print_select(&driver, &models, &query, count)
        }
    }
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    let program = ModelProgram::from_file(path)
        .with_context(|| format!("Failed to read models from '{}'", path.display()))?;
    let catalog = program.register(Catalog::new())?;
    catalog.validate()?;
    Ok(catalog)
}

fn print_schema(driver: &str, models: &Path) -> Result<()> {
    let adapter = get_adapter(driver)?;
    let catalog = load_catalog(models)?;
    let statements = schema::create_tables_sql(adapter.as_ref(), &catalog)?;
    if statements.is_empty() {
        return Err(anyhow!("No models declared in '{}'", models.display()));
    }
    for stmt in statements {
        println!("{};", stmt);
    }
    Ok(())
}

fn print_select(driver: &str, models: &Path, query: &Query, count: bool) -> Result<()> {
    let adapter = get_adapter(driver)?;
    let catalog = load_catalog(models)?;
    let compiler = SqlCompiler::new(&catalog, adapter.as_ref(), query)?;
    let stmt = if count { compiler.count()? } else { compiler.select()? };

    println!("{};", adapter.rebind(&stmt.sql));
    if !stmt.args.is_empty() {
        let args: Vec<String> = stmt.args.iter().map(|a| a.to_sql_literal()).collect();
        println!("-- args: [{}]", args.join(", "));
    }
    Ok(())
}
