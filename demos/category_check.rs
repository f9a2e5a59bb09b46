use category_gate::{AccessManager, Client};

// Update these to match the flag and JSON variable authored remotely.
const FEATURE_FLAG_KEY: &str = "demo_feature_flag";
const JSON_VARIABLE_KEY: &str = "allowed_categories";

fn capitalized(category: &str) -> String {
    let mut chars = category.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let client = Client::builder().from_env().build()?;
    let manager = AccessManager::new(client);

    println!("Initializing feature flags...");
    if !manager.initialize().await {
        eprintln!("Feature flags unavailable, every category will be denied");
    }

    let mut categories: Vec<String> = std::env::args().skip(1).collect();
    if categories.is_empty() {
        categories = vec!["premium".to_string(), "gold".to_string(), "silver".to_string()];
    }

    for category in categories {
        if manager.check_access(FEATURE_FLAG_KEY, &category, JSON_VARIABLE_KEY) {
            println!("[granted] User category found. Welcome!");
        } else {
            println!("[denied]  Content is hidden for silver members");
        }
        println!("          Category: {}", capitalized(&category));
    }

    Ok(())
}
