use screenpoint::commands::{self, USAGE};

#[tokio::main]
async fn main() {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
    screenpoint::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match commands::parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config = match screenpoint::config::load_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    match commands::run(command, &config).await {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode output");
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            std::process::exit(1);
        }
    }
}
