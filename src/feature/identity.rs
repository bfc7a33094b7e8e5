use colored::*;
use std::error::Error;
use std::fs;
use std::path::Path;

use crate::api::client::SealClient;
use crate::api::types::users;
use crate::crypt;
use crate::key_store::{self, KeyStore};
use crate::term::Step;

/// Generates a fresh key pair and registers it with the directory under
/// `name` and `email`. Returns the new user id.
///
/// The private key is kept even if registration fails, so it can be
/// registered again without rotating.
pub async fn create_id(
    client: &SealClient,
    store: &impl KeyStore,
    name: &str,
    email: &str,
) -> Result<String, Box<dyn Error>> {
    let public_key =
        Step::start("Generating RSA key pair")?.finish(key_store::generate_key_pair(store))?;

    let result = Step::start("Registering identity")?
        .finish(
            client
                .users_register(users::UsersRegisterArg {
                    name: name.to_string(),
                    email: email.to_string(),
                    public_key,
                })
                .await,
        )?;
    println!("Identity #{} created for {}", result.user_id.bold(), name);
    Ok(result.user_id)
}

/// Prints users matching `query` that can receive files.
pub async fn search_id(client: &SealClient, query: &str) -> Result<(), Box<dyn Error>> {
    let results = Step::start(&format!("Searching for '{}'", query))?.finish(
        client
            .users_search(users::UsersSearchArg {
                data_search: query.to_string(),
            })
            .await,
    )?;

    let reachable: Vec<&users::UserEntry> = results
        .iter()
        .filter(|user| user.public_key.as_deref().is_some_and(|k| !k.is_empty()))
        .collect();
    println!("{} users found:", reachable.len());
    for (i, user) in reachable.iter().enumerate() {
        println!("[{}] {}, {}, ID: {}", i + 1, user.name, user.email, user.user_id);
    }
    Ok(())
}

pub async fn delete_id(client: &SealClient, user_id: &str) -> Result<(), Box<dyn Error>> {
    let result = Step::start(&format!("Deleting identity #{}", user_id))?.finish(
        client
            .users_delete(users::UsersDeleteArg {
                user_id: user_id.to_string(),
            })
            .await,
    )?;
    println!("Identity #{} deleted", result.user_id);
    Ok(())
}

/// Local-only key generation. Replaces any existing private key.
pub fn keygen(store: &impl KeyStore) -> Result<(), Box<dyn Error>> {
    let public_pem =
        Step::start("Generating RSA key pair")?.finish(key_store::generate_key_pair(store))?;
    print_public_key(&public_pem)
}

/// Prints the public half of the local key, or writes it to `out`.
pub fn export_key(store: &impl KeyStore, out: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let public_pem = key_store::export_public_key(store)?;
    match out {
        Some(path) => {
            fs::write(path, &public_pem)?;
            println!("Public key written to {}", path.display());
            Ok(())
        }
        None => print_public_key(&public_pem),
    }
}

fn print_public_key(public_pem: &str) -> Result<(), Box<dyn Error>> {
    let key = crypt::public_key_from_pem(public_pem).ok_or("generated public key does not parse")?;
    print!("{}", public_pem);
    println!("Fingerprint: {}", crypt::key_fingerprint(&key)?.cyan());
    Ok(())
}
