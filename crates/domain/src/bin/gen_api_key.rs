use std::process;

use nanopay_domain::model::ApiKeySecret;

fn main() {
    let secret = match ApiKeySecret::generate() {
        Ok(secret) => secret,
        Err(err) => {
            eprintln!("failed to generate api key: {err}");
            process::exit(1);
        }
    };

    let hash = secret.hash();
    println!("API key: {}", secret.as_str());
    println!("Stored hash: {}", hash.as_str());
}
