//! The `skillcast init` command.

use anyhow::Result;

use skillcast_core::config::{default_config_toml, CONFIG_FILE_NAME};

pub fn execute() -> Result<()> {
    // Create skillcast.toml
    if std::path::Path::new(CONFIG_FILE_NAME).exists() {
        println!("{CONFIG_FILE_NAME} already exists, skipping.");
    } else {
        std::fs::write(CONFIG_FILE_NAME, default_config_toml())?;
        println!("Created {CONFIG_FILE_NAME}");
    }

    // Create example dataset
    std::fs::create_dir_all("data")?;
    let example_path = std::path::Path::new("data/example.toml");
    if example_path.exists() {
        println!("data/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_DATASET)?;
        println!("Created data/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: skillcast validate --data data/example.toml");
    println!("  2. Run: skillcast forecast --data data/example.toml --participant p-001");
    println!("  3. Run: skillcast cohort --data data --format all");

    Ok(())
}

const EXAMPLE_DATASET: &str = r#"[dataset]
name = "Example cohort"

[[participants]]
id = "p-001"
name = "Alex"
cohort = "2024A"

[[participants]]
id = "p-002"
name = "Sam"
cohort = "2024A"

[[assessments]]
participant = "p-001"
date = 2024-01-15

[assessments.scores]
word_problems = { achieved = 8, maximum = 20 }
spatial_reasoning = { achieved = 10, maximum = 20 }
arithmetic = { achieved = 12, maximum = 20 }
number_range = { achieved = 5, maximum = 15 }
equations = { achieved = 4, maximum = 15 }
fractions = { achieved = 2, maximum = 10 }

[[assessments]]
participant = "p-001"
date = 2024-02-15

[assessments.scores]
word_problems = { achieved = 11, maximum = 20 }
spatial_reasoning = { achieved = 12, maximum = 20 }
arithmetic = { achieved = 15, maximum = 20 }
number_range = { achieved = 8, maximum = 15 }
equations = { achieved = 6, maximum = 15 }
fractions = { achieved = 4, maximum = 10 }

[[assessments]]
participant = "p-001"
date = 2024-03-15

[assessments.scores]
word_problems = { achieved = 13, maximum = 20 }
spatial_reasoning = { achieved = 15, maximum = 20 }
arithmetic = { achieved = 17, maximum = 20 }
number_range = { achieved = 10, maximum = 15 }
equations = { achieved = 9, maximum = 15 }
fractions = { achieved = 5, maximum = 10 }

[[assessments]]
participant = "p-002"
date = 2024-01-20

[assessments.scores]
word_problems = { achieved = 14, maximum = 20 }
spatial_reasoning = { achieved = 9, maximum = 20 }
arithmetic = { achieved = 18, maximum = 20 }
number_range = { achieved = 11, maximum = 15 }
equations = { achieved = 7, maximum = 15 }
fractions = { achieved = 6, maximum = 10 }
"#;
