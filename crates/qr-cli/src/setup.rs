use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

const CONFIG_TEMPLATE: &str = r#"# qr configuration
#
# Every value below is the built-in default. Values can also be set in
# ./qr.toml or through QR_-prefixed environment variables, e.g.
#   QR_LLM__MODEL=qwen2.5:7b qr serve

# ── Model ────────────────────────────────────────────────────────
# Any OpenAI-compatible chat completions endpoint (Ollama by default).
[llm]
base_url = "http://localhost:11434/v1"
# api_key = "ollama"              # or set OPENAI_API_KEY env var
model = "llama3.2:3b"
# temperature = 0.2
max_retries = 2                   # retries of transient provider errors
json_retries = 1                  # corrective re-prompts for malformed JSON

# ── Research loop ────────────────────────────────────────────────
[research]
max_iterations = 3                # loop-backs per chain
results_per_query = 3
max_source_chars = 20000          # text kept per fetched page
dedup_capacity = 1024             # recently handled messages remembered

# ── Search ───────────────────────────────────────────────────────
[search]
engine = "duckduckgo"             # or "searxng"
# searxng_url = "http://localhost:8888"
timeout_secs = 20

# ── Storage ──────────────────────────────────────────────────────
[storage]
reports_dir = "~/.local/share/qr/reports"

# ── HTTP ingress ─────────────────────────────────────────────────
[server]
bind = "127.0.0.1:3000"
"#;

pub fn run() -> Result<()> {
    let config_dir = Config::config_dir()?;
    let config_path = config_dir.join("config.toml");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    if config_path.exists() {
        println!("Existing config file found:\n  {}", config_path.display());
        print!("\nOverwrite? (The existing file will be backed up) [y/N] ");

        // Flush stdout so the prompt appears before reading
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }
        backup_file(&config_path)?;
    }

    write_template(&config_path)?;
    println!("Created {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Start a model server:  ollama serve && ollama pull llama3.2:3b");
    println!("  2. Run one topic:         qr run \"quantum error correction\"");
    println!("  3. Or serve HTTP:         qr serve");

    Ok(())
}

fn write_template(path: &Path) -> Result<()> {
    std::fs::write(path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Back up a file to <name>.bak, appending a timestamp if .bak already exists.
fn backup_file(path: &Path) -> Result<()> {
    let mut backup = path.with_extension("toml.bak");

    if backup.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        backup = path.with_extension(format!("toml.bak.{}", timestamp));
    }

    std::fs::rename(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;
    println!("  Backed up to {}", backup.display());

    Ok(())
}
