//! `workbench init`: first-time setup.

use workbench_config::EngineConfig;

const EXAMPLE_AGENT: &str = r#"{
  "name": "reviewer",
  "description": "Reviews a change for bugs and unclear code. Give it the file paths to read.",
  "model": "inherit",
  "allowed_tools": ["file_read"],
  "skills": ["review-checklist"],
  "system_prompt": "You are a careful code reviewer. Read the files you are pointed at and report concrete problems, most severe first."
}
"#;

const EXAMPLE_SKILL: &str = "\
# Review checklist

- Does every error path leave the system in a consistent state?
- Are inputs validated where they enter the system?
- Is anything named for how it works instead of what it does?
";

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = EngineConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Workbench — First-Time Setup");
    println!("============================\n");

    std::fs::create_dir_all(&config_dir)?;
    println!("  Config directory: {}", config_dir.display());

    if config_path.exists() {
        println!("  ⚠️  Config already exists at {}; leaving it alone", config_path.display());
    } else {
        std::fs::write(&config_path, EngineConfig::default_toml())?;
        println!("  ✅ Created {}", config_path.display());
    }

    // Directories come from the (possibly pre-existing) config.
    let config = EngineConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let agents_dir = config.agents_dir();
    let skills_dir = config.skills_dir();

    if !agents_dir.exists() {
        std::fs::create_dir_all(&agents_dir)?;
        std::fs::write(agents_dir.join("reviewer.json"), EXAMPLE_AGENT)?;
        println!("  ✅ Created {} with an example agent", agents_dir.display());
    }
    if !skills_dir.exists() {
        std::fs::create_dir_all(&skills_dir)?;
        std::fs::write(skills_dir.join("review-checklist.md"), EXAMPLE_SKILL)?;
        println!("  ✅ Created {} with an example skill", skills_dir.display());
    }

    if !config.has_api_key() {
        println!("\n  Next: set ANTHROPIC_API_KEY or add api_key to {}", config_path.display());
    }
    println!("\n  Run a session with: workbench run session.json\n");

    Ok(())
}
