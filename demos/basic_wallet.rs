use hd_wallet_core::{Chain, KeyfileStore, WalletConfig, WalletCore};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const WALLET_ID: &str = "default";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("HD Wallet Core Demo");
    println!("===================");

    let config = WalletConfig::from_env()?;
    let storage_dir = config
        .keyfile_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("./wallet-data"));
    let store = KeyfileStore::new(&storage_dir)?;
    let wallet = WalletCore::new(config)?;

    let keyfile = store.path_for(WALLET_ID)?;
    let password = prompt_password("Enter your wallet password: ")?;

    if store.exists(WALLET_ID) {
        println!("Loading existing wallet '{}'...", WALLET_ID);
        wallet.restore_from_keyfile(&keyfile, &password)?;
    } else {
        println!("Creating new wallet '{}'...", WALLET_ID);
        let phrase = wallet.generate_mnemonic(12)?;

        println!("\nIMPORTANT: Write down your mnemonic phrase and store it securely!");
        println!("Mnemonic: {}\n", phrase);
        print!("Press Enter to continue...");
        io::stdout().flush()?;
        let mut buffer = String::new();
        io::stdin().read_line(&mut buffer)?;

        wallet.restore_from_mnemonic(&phrase)?;
        wallet.save_keyfile(&keyfile, &password)?;
        println!("Saved keyfile to {}", keyfile.display());
    }

    println!("\nAccount 0 addresses on {}:", wallet.config().network);
    for chain in Chain::ALL {
        let path = WalletCore::address_path(chain, 0)?;
        let address = wallet.derive_address_for(chain, 0)?;
        let balance = wallet.get_balance(chain.symbol(), &address).await?;

        println!("\n{}", chain);
        println!("Path:      {}", path);
        println!("Address:   {}", address);
        println!("Balance:   {}", balance);
    }

    let account_path = "m/44'/0'/0'";
    println!("\nBitcoin account xpub ({}):", account_path);
    println!("{}", wallet.derive_xpub(account_path)?);

    wallet.clear();
    println!("\nWallet operations completed successfully!");
    Ok(())
}

fn prompt_password(prompt: &str) -> Result<String, Box<dyn std::error::Error>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    Ok(rpassword::read_password()?)
}
