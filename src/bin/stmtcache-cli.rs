//! stmtcache 交互式 SQL shell
//!
//! 基于 SQLite 引擎，演示语句缓存、多语句执行与 executemany

use anyhow::{bail, Context};
use clap::Parser;
use stmtcache::{
    exec_tracer, Bindings, BoundParams, CacheStats, ConnectionConfig, SqliteConnection, Value,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::Level;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "stmtcache-cli", version, about = "Interactive SQL shell with a statement cache")]
struct Args {
    /// Database file (in-memory database when omitted)
    db_path: Option<PathBuf>,

    /// Statement cache capacity (0 disables caching)
    #[arg(long)]
    cache_size: Option<usize>,

    /// Connection config as a JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// How the next statement gets its bindings.
enum Pending {
    None,
    Bind(Bindings),
    Many(Vec<Bindings>),
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ConnectionConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConnectionConfig::default(),
    };
    if let Some(capacity) = args.cache_size {
        config.cache.capacity = capacity;
    }

    let conn = match &args.db_path {
        Some(path) => SqliteConnection::open_with_config(path, config)
            .with_context(|| format!("opening {}", path.display()))?,
        None => SqliteConnection::open_in_memory_with_config(config)?,
    };

    println!("🚀 stmtcache v{}", VERSION);
    match &args.db_path {
        Some(path) => println!("📂 Database: {}", path.display()),
        None => println!("📂 Database: :memory:"),
    }
    println!(
        "🗄️  Statement cache: {} slots",
        conn.config().cache.capacity
    );
    println!("💡 Type '.help' for help, '.exit' to quit\n");

    interactive_mode(&conn)
}

fn interactive_mode(conn: &SqliteConnection) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut buffer = String::new();
    let mut multiline_sql = String::new();
    let mut pending = Pending::None;

    loop {
        if multiline_sql.is_empty() {
            print!("sql> ");
        } else {
            print!(" -> ");
        }
        io::stdout().flush()?;

        buffer.clear();
        if stdin.lock().read_line(&mut buffer)? == 0 {
            break;
        }
        let input = buffer.trim();

        if input.starts_with('.') {
            if !multiline_sql.is_empty() {
                eprintln!("⚠️  Warning: Incomplete SQL statement discarded");
                multiline_sql.clear();
            }
            match run_command(conn, input, &mut pending) {
                Ok(true) => continue,
                Ok(false) => {
                    println!("👋 Goodbye!");
                    break;
                }
                Err(e) => {
                    eprintln!("❌ Error: {:#}", e);
                    continue;
                }
            }
        }

        if input.is_empty() {
            continue;
        }

        multiline_sql.push_str(input);
        multiline_sql.push('\n');

        if input.ends_with(';') {
            let bindings = std::mem::replace(&mut pending, Pending::None);
            if let Err(e) = execute(conn, &multiline_sql, bindings) {
                eprintln!("❌ Error: {}", e);
            }
            multiline_sql.clear();
        }
    }

    Ok(())
}

/// Handle a dot-command. `Ok(false)` means quit.
fn run_command(conn: &SqliteConnection, input: &str, pending: &mut Pending) -> anyhow::Result<bool> {
    let (cmd, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
    let rest = rest.trim();

    match cmd {
        ".exit" | ".quit" => return Ok(false),
        ".help" => print_interactive_help(),
        ".stats" => display_stats(&conn.cache_stats()?),
        ".clear" => {
            conn.clear_cache()?;
            println!("✅ Statement cache cleared");
        }
        ".bind" => {
            *pending = Pending::Bind(Bindings::from_json_str(rest)?);
            println!("✅ Bindings set for the next statement");
        }
        ".many" => {
            let json: serde_json::Value = serde_json::from_str(rest)?;
            let serde_json::Value::Array(items) = json else {
                bail!(".many expects a JSON array of binding sets");
            };
            let batch = items
                .into_iter()
                .map(Bindings::from_json)
                .collect::<stmtcache::Result<Vec<_>>>()?;
            println!("✅ Next statement runs {} time(s)", batch.len());
            *pending = Pending::Many(batch);
        }
        ".trace" => match rest {
            "on" => {
                conn.set_exec_tracer(Some(exec_tracer(|trace| {
                    let bound = match trace.bindings {
                        BoundParams::Positional(values) => serde_json::Value::from(
                            values.iter().map(serde_json::Value::from).collect::<Vec<_>>(),
                        ),
                        BoundParams::Named(map) => map
                            .iter()
                            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                            .collect::<serde_json::Map<_, _>>()
                            .into(),
                    };
                    eprintln!("🔎 {}  {}", trace.sql, bound);
                    true
                })));
                println!("✅ Tracing on");
            }
            "off" => {
                conn.set_exec_tracer(None);
                println!("✅ Tracing off");
            }
            _ => bail!("usage: .trace on|off"),
        },
        _ => {
            eprintln!("❌ Unknown command: {}", input);
            println!("💡 Type '.help' for available commands");
        }
    }
    Ok(true)
}

fn execute(conn: &SqliteConnection, sql: &str, pending: Pending) -> stmtcache::Result<()> {
    let mut cursor = match pending {
        Pending::None => conn.execute(sql, ())?,
        Pending::Bind(bindings) => conn.execute(sql, bindings)?,
        Pending::Many(batch) => conn.execute_many(sql, batch)?,
    };

    let columns = cursor.columns()?;
    let rows = cursor.fetch_all()?;
    if columns.is_empty() {
        println!("✅ OK ({} row(s) changed)", conn.changes()?);
    } else {
        display_table(&columns, &rows);
    }
    Ok(())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) => format!("{:.2}", f),
        Value::Text(s) => {
            if s.chars().count() > 50 {
                format!("{}...", s.chars().take(47).collect::<String>())
            } else {
                s.clone()
            }
        }
        Value::Blob(b) => format!("<blob {} bytes>", b.len()),
        Value::ZeroBlob(n) => format!("<zeroblob {}>", n),
    }
}

fn display_table(columns: &[String], rows: &[Vec<Value>]) {
    if rows.is_empty() {
        println!("📊 No results");
        return;
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|col| col.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let border = |left: &str, mid: &str, right: &str| {
        let parts: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        println!("{}{}{}", left, parts.join(mid), right);
    };

    border("┌", "┬", "┐");
    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(col, width)| format!(" {:width$} ", col, width = width))
        .collect();
    println!("│{}│", header.join("│"));
    border("├", "┼", "┤");

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!(" {:width$} ", cell, width = width))
            .collect();
        println!("│{}│", line.join("│"));
    }
    border("└", "┴", "┘");

    println!("\n📊 {} row(s) returned", rows.len());
}

fn display_stats(stats: &CacheStats) {
    println!("📋 Statement cache");
    println!("  • slots:     {} / {} ({} in use)", stats.size, stats.capacity, stats.in_use);
    println!("  • hits:      {}", stats.hits);
    println!("  • misses:    {}", stats.misses);
    println!("  • evictions: {}", stats.evictions);
    println!("  • bypassed:  {}", stats.bypassed);
    println!("  • hit rate:  {:.1}%", stats.hit_rate() * 100.0);
}

fn print_interactive_help() {
    println!(
        r#"
特殊命令:
  .help              显示此帮助
  .exit, .quit       退出程序
  .stats             显示语句缓存统计
  .clear             清空语句缓存
  .bind <json>       为下一条 SQL 设置参数 (数组 = 位置参数, 对象 = 命名参数)
  .many <json>       下一条 SQL 按参数数组逐组执行 (executemany)
  .trace on|off      打印每条执行的语句及其参数

SQL 示例:
  CREATE TABLE users (id INTEGER, name TEXT);
  .many [[1, "Alice"], [2, "Bob"]]
  INSERT INTO users VALUES (?, ?);
  .bind {{"id": 1}}
  SELECT * FROM users WHERE id = :id;
  SELECT 1; SELECT 2;
"#
    );
}
