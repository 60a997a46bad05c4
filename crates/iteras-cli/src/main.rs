// ============================================================================
// iteras-admin - CLI for the ITERAS paywall settings database
// ============================================================================
// Usage:
//   iteras-admin show                           Show settings and statistics
//   iteras-admin init                           Create default settings
//   iteras-admin migrate                        Upgrade stored settings
//   iteras-admin set FIELD VALUE                Change one settings field
//   iteras-admin set-paywall ID [IDS]           Declare a content item's paywalls
//   iteras-admin verify --pass P --paywall IDS  Check a pass against paywalls
//   iteras-admin render --input FILE ...        Gate a content body
//   iteras-admin migrate-posts                  Convert legacy content paywalls
//   iteras-admin export                         Dump everything as JSON
//   iteras-admin reset --yes                    Clear settings and content paywalls
//   iteras-admin uninstall --yes                Remove the settings record
// ============================================================================

use std::io::Read;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use iteras_core::access::{parse_expiry, parse_pass, AccessGate};
use iteras_core::directives::parse_paywall_ids;
use iteras_core::{
    ContentGate, ContentRef, IterasDb, OutputContext, PaywallMeta, RequestContext, Settings,
    SettingsMigrator, SettingsStore,
};
use tracing::info;

const REDACTED: &str = "<redacted>";

/// ITERAS paywall administration tool
#[derive(Parser)]
#[command(name = "iteras-admin", version, about = "Inspect and manage ITERAS paywall settings")]
struct Cli {
    /// Path to the database file (default: ~/.iteras/iteras.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show resolved settings and database statistics
    Show,

    /// Create default settings if none exist
    Init,

    /// Upgrade the stored settings record to the current schema
    Migrate,

    /// Set one settings field (e.g. paywall_display_type samepage)
    Set { field: String, value: String },

    /// Declare the paywalls of a content item (no ids clears it)
    SetPaywall {
        content_id: String,

        /// Comma-separated paywall ids
        ids: Option<String>,

        /// Store the legacy "sub" marker (all configured paywalls)
        #[arg(long, conflicts_with = "ids")]
        legacy: bool,
    },

    /// Check a pass against paywall ids using the stored signing key
    Verify {
        /// Raw pass token (value of the iteraspass cookie)
        #[arg(long)]
        pass: String,

        /// Comma-separated paywall ids (default: all configured paywalls)
        #[arg(long)]
        paywall: Option<String>,
    },

    /// Run a content body through the gate and directive expansion
    Render {
        /// File with the content body, or - for stdin
        #[arg(long)]
        input: String,

        /// Comma-separated paywall ids declared by the content
        #[arg(long)]
        paywall: Option<String>,

        /// Look up the paywall declaration stored for this content id
        #[arg(long, conflicts_with = "paywall")]
        content_id: Option<String>,

        /// Raw pass token presented by the reader
        #[arg(long)]
        pass: Option<String>,

        /// Render for a syndication feed
        #[arg(long)]
        feed: bool,

        /// Render as a logged-in editor
        #[arg(long)]
        editor: bool,

        /// Request path used by return-to-page links
        #[arg(long, default_value = "/")]
        request_uri: String,
    },

    /// Convert legacy content paywall declarations to id lists
    MigratePosts,

    /// Export settings and content paywalls as JSON (keys redacted)
    Export,

    /// Delete the settings record and every content paywall declaration
    Reset {
        #[arg(long)]
        yes: bool,
    },

    /// Delete the settings record
    Uninstall {
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("iteras_core=info".parse()?)
                .add_directive("iteras_admin=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let db = IterasDb::open(cli.db_path.as_deref())?;

    match cli.command {
        Commands::Show => cmd_show(&db),
        Commands::Init => cmd_init(&db),
        Commands::Migrate => cmd_migrate(&db),
        Commands::Set { field, value } => cmd_set(&db, &field, &value),
        Commands::SetPaywall {
            content_id,
            ids,
            legacy,
        } => cmd_set_paywall(&db, &content_id, ids.as_deref(), legacy),
        Commands::Verify { pass, paywall } => cmd_verify(&db, &pass, paywall.as_deref()),
        Commands::Render {
            input,
            paywall,
            content_id,
            pass,
            feed,
            editor,
            request_uri,
        } => {
            let mut request = RequestContext::new().with_request_uri(request_uri);
            if let Some(pass) = pass {
                request = request.with_pass(pass);
            }
            if feed {
                request = request.with_output(OutputContext::Feed);
            }
            if editor {
                request = request.as_editor();
            }
            cmd_render(&db, &input, paywall.as_deref(), content_id.as_deref(), &request)
        }
        Commands::MigratePosts => cmd_migrate_posts(&db),
        Commands::Export => cmd_export(&db),
        Commands::Reset { yes } => cmd_reset(&db, yes),
        Commands::Uninstall { yes } => cmd_uninstall(&db, yes),
    }
}

fn redact(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        REDACTED
    }
}

fn cmd_show(db: &IterasDb) -> Result<()> {
    let settings = Settings::load(db);
    let stats = db.stats()?;

    println!("=== ITERAS Paywall Settings ===");
    println!("Database: {}", db.path().display());
    println!();
    println!(
        "Stored version:     {}",
        stats.settings_version.as_deref().unwrap_or("(none)")
    );
    println!("Signing key:        {}", redact(&settings.signing_key));
    println!("API key:            {}", redact(&settings.api_key));
    println!("Profile:            {}", settings.profile_name);
    println!("Subscribe URL:      {}", settings.subscribe_url);
    println!("User URL:           {}", settings.user_url);
    println!("Paywalls:           {}", settings.paywall_ids().join(", "));
    println!(
        "Integration method: {}",
        settings.paywall_integration_method.as_str()
    );
    println!("Display type:       {}", settings.paywall_display_type.as_str());
    println!(
        "Server validation:  {}",
        settings.paywall_server_side_validation
    );
    println!("Snippet size:       {}", settings.paywall_snippet_size);
    println!(
        "Paywall box:        {}",
        if settings.paywall_box.is_empty() { "(empty)" } else { "(set)" }
    );
    println!();
    println!(
        "Content paywalls:   {} ({} legacy)",
        stats.paywalled_content, stats.legacy_content
    );

    Ok(())
}

fn cmd_init(db: &IterasDb) -> Result<()> {
    if db.load_record()?.is_some() {
        println!("Settings already exist. Run `iteras-admin migrate` to upgrade them.");
        return Ok(());
    }
    Settings::load_or_init(db)?;
    println!("Created default settings.");
    Ok(())
}

fn cmd_migrate(db: &IterasDb) -> Result<()> {
    match SettingsMigrator::new().run(db)? {
        Some(report) => {
            println!("Migrated settings v{} -> v{}", report.from, report.to);
            for step in &report.applied {
                println!("  - {}", step);
            }
        }
        None => println!("Nothing to migrate."),
    }
    Ok(())
}

fn cmd_set(db: &IterasDb, field: &str, value: &str) -> Result<()> {
    let mut settings = Settings::load_or_init(db)?;
    settings.set_field(field, value)?;
    settings.save(db)?;

    let shown = match field {
        "signing_key" | "api_key" => REDACTED,
        _ => value,
    };
    info!("Updated settings field {}", field);
    println!("{} = {}", field, shown);
    Ok(())
}

fn cmd_set_paywall(db: &IterasDb, content_id: &str, ids: Option<&str>, legacy: bool) -> Result<()> {
    let meta = if legacy {
        PaywallMeta::Legacy("sub".to_string())
    } else {
        match ids.map(parse_paywall_ids) {
            Some(ids) if !ids.is_empty() => PaywallMeta::Ids(ids),
            _ => PaywallMeta::Absent,
        }
    };

    db.store_paywall_meta(content_id, &meta)?;
    match meta {
        PaywallMeta::Absent => println!("Content {} is no longer paywalled", content_id),
        other => println!("Content {} paywall: {}", content_id, serde_json::to_string(&other)?),
    }
    Ok(())
}

fn cmd_verify(db: &IterasDb, pass: &str, paywall: Option<&str>) -> Result<()> {
    let settings = Settings::load(db);
    let requested = match paywall {
        Some(ids) => parse_paywall_ids(ids),
        None => settings.paywall_ids(),
    };

    match parse_pass(pass) {
        Ok(token) => {
            println!("Algorithm: {}", token.signature.algorithm);
            let expiry = parse_expiry(&token.expiry)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| format!("(invalid: {})", token.expiry));
            println!("Expires:   {}", expiry);
            for (paywall_id, level) in token.grants() {
                println!("  {:<20} {}", paywall_id, level);
            }
        }
        Err(e) => println!("Unparseable pass: {}", e),
    }

    println!("Checked at: {}", Utc::now().to_rfc3339());
    println!("Requested:  {}", requested.join(", "));

    match AccessGate::new().check_pass(pass, &requested, &settings.signing_key()) {
        Ok(true) => println!("Result:     authorized"),
        Ok(false) => println!("Result:     not authorized (no subscriber access)"),
        Err(e) => println!("Result:     not authorized ({})", e),
    }
    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("Failed to read stdin")?;
        Ok(body)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))
    }
}

fn cmd_render(
    db: &IterasDb,
    input: &str,
    paywall: Option<&str>,
    content_id: Option<&str>,
    request: &RequestContext,
) -> Result<()> {
    let body = read_input(input)?;
    let settings = Settings::load(db);

    let content = match (paywall, content_id) {
        (Some(ids), _) => ContentRef::new("cli").with_paywall(PaywallMeta::Ids(parse_paywall_ids(ids))),
        (None, Some(id)) => ContentRef::new(id).with_paywall(db.get_paywall_meta(id)?),
        (None, None) => ContentRef::new("cli"),
    };

    let gate = ContentGate::new(&settings);
    println!("{}", gate.render_content(&body, &content, request));
    Ok(())
}

fn cmd_migrate_posts(db: &IterasDb) -> Result<()> {
    let settings = Settings::load(db);
    let stats = db.migrate_paywall_meta(&settings.paywall_ids())?;
    println!(
        "Content paywalls: {} kept, {} updated, {} removed",
        stats.kept, stats.updated, stats.removed
    );
    Ok(())
}

fn cmd_export(db: &IterasDb) -> Result<()> {
    let stats = db.stats()?;
    let mut settings = match db.load_record()? {
        Some(record) => serde_json::to_value(&record)?,
        None => serde_json::Value::Null,
    };
    if let Some(fields) = settings.as_object_mut() {
        for key in ["signing_key", "api_key"] {
            if let Some(value) = fields.get_mut(key) {
                *value = serde_json::Value::String(REDACTED.to_string());
            }
        }
    }

    let mut content = serde_json::Map::new();
    for (id, meta) in db.list_paywall_meta()? {
        content.insert(id, serde_json::to_value(&meta)?);
    }

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "stats": stats,
        "settings": settings,
        "content_paywalls": content,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

fn cmd_reset(db: &IterasDb, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to reset without --yes");
    }
    db.reset()?;
    println!("Cleared settings and all content paywalls.");
    Ok(())
}

fn cmd_uninstall(db: &IterasDb, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to uninstall without --yes");
    }
    if db.uninstall()? {
        println!("Removed settings record.");
    } else {
        println!("No settings record to remove.");
    }
    Ok(())
}
