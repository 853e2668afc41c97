use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{TransferResult, WalletService};
use crate::config::WalletConfig;
use crate::domain::{
    format_amount, format_cents, parse_cents, Balances, Biller, Currency, Flow, PaymentMethod,
    Rate, RemittanceDraft, SpendingAnalyzer, Transaction,
};

/// M.I.A. Wallet - two-currency wallet ledger
#[derive(Parser)]
#[command(name = "mia-wallet")]
#[command(about = "A demo wallet holding USDT and Bolívares with a consistent transaction ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, global = true, default_value = "mia-wallet.db")]
    pub database: String,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Account to operate on (defaults to the configured user)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and open an account
    Init {
        /// Seed the account with the demo balances and history
        #[arg(long)]
        demo: bool,

        /// Opening USDT balance (e.g., "100.00")
        #[arg(long, default_value = "0")]
        stable: String,

        /// Opening BS balance (e.g., "2500.00")
        #[arg(long, default_value = "0")]
        fiat: String,
    },

    /// Show both balances
    Balance,

    /// List recent transactions, newest first
    History {
        /// Maximum number of transactions to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Pay with the card: amount in BS, charged to USDT at the reference rate
    Card {
        /// Amount in BS (e.g., "250.00")
        amount: String,

        /// Merchant name
        #[arg(long, default_value = "")]
        merchant: String,
    },

    /// Pay a utility bill in BS, converting from USDT if needed
    Bill {
        /// Biller: electricity, water, gas, telephone, internet, municipal-taxes
        biller: String,

        /// Amount in BS
        amount: String,

        /// Contract or invoice reference
        #[arg(long)]
        reference: String,
    },

    /// Send USDT to another user
    Send {
        /// Recipient user id
        recipient: String,

        /// Amount in USDT
        amount: String,

        /// Payment method: app-balance, card, bank-transfer
        #[arg(short, long, default_value = "app-balance")]
        method: String,

        /// Confirm and send (otherwise only the quote is shown)
        #[arg(short, long)]
        yes: bool,
    },

    /// Buy USDT with BS at the exchange auction
    Buy {
        /// Amount in BS to spend
        amount: String,

        /// Auction rate in BS per USDT (defaults to the reference rate)
        #[arg(short, long)]
        rate: Option<String>,
    },

    /// Sell USDT for BS at the exchange auction
    Sell {
        /// Amount in USDT to sell
        amount: String,

        /// Auction rate in BS per USDT (defaults to the reference rate)
        #[arg(short, long)]
        rate: Option<String>,
    },

    /// Report a national bank transfer that tops up the BS balance
    Topup {
        /// Amount in BS
        amount: String,

        /// Originating bank
        #[arg(long)]
        bank: String,

        /// Transfer reference number
        #[arg(long)]
        reference: String,
    },

    /// QR payments
    #[command(subcommand)]
    Qr(QrCommands),

    /// Referral program
    #[command(subcommand)]
    Referral(ReferralCommands),

    /// Show the receipt of the last operation or of a given transaction
    Receipt {
        /// Transaction ID (defaults to the most recent one)
        id: Option<String>,
    },

    /// Summarize spending and suggest where to save
    Analyze,

    /// Verify that balances match the transaction history
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: history (CSV), snapshot (JSON)
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum QrCommands {
    /// Print a code others can scan to pay you
    Generate {
        /// Amount in USDT
        amount: String,
    },

    /// Pay a scanned code
    Pay {
        /// Encoded QR payload
        code: String,
    },
}

#[derive(Subcommand)]
pub enum ReferralCommands {
    /// Show your referral code
    Code,

    /// Redeem a friend's code for the welcome bonus
    Redeem {
        /// Referral code (e.g., MIA-ANA)
        code: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = WalletConfig::load(self.config.as_deref())?;
        let user = self
            .user
            .clone()
            .unwrap_or_else(|| config.default_user.clone());

        match self.command {
            Commands::Init { demo, stable, fiat } => {
                let service = WalletService::init(&self.database, config).await?;
                let account = if demo {
                    service.seed_demo(&user).await?
                } else {
                    let opening = Balances::new(
                        parse_cents(&stable).context("Invalid USDT amount")?,
                        parse_cents(&fiat).context("Invalid BS amount")?,
                    );
                    service.open_account(&user, opening).await?
                };
                println!("Database initialized: {}", self.database);
                println!("Account {} opened with {}", account.user_id, account.balances);
            }

            Commands::Balance => {
                let service = WalletService::connect(&self.database, config).await?;
                run_balance_command(&service, &user).await?;
            }

            Commands::History { limit } => {
                let service = WalletService::connect(&self.database, config).await?;
                run_history_command(&service, &user, limit).await?;
            }

            Commands::Card { amount, merchant } => {
                let service = WalletService::connect(&self.database, config).await?;
                let txn = service
                    .charge_card(&user, &merchant, parse_amount(&amount)?)
                    .await?;
                print_receipt(&txn);
            }

            Commands::Bill {
                biller,
                amount,
                reference,
            } => {
                let service = WalletService::connect(&self.database, config).await?;
                let biller = Biller::from_str(&biller).with_context(|| {
                    format!(
                        "Unknown biller '{}'. Valid billers: {}",
                        biller,
                        Biller::ALL.map(|b| b.as_str()).join(", ")
                    )
                })?;
                let txn = service
                    .pay_bill(&user, biller, &reference, parse_amount(&amount)?)
                    .await?;
                print_receipt(&txn);
            }

            Commands::Send {
                recipient,
                amount,
                method,
                yes,
            } => {
                let service = WalletService::connect(&self.database, config).await?;
                let method = PaymentMethod::from_str(&method).with_context(|| {
                    format!(
                        "Unknown payment method '{}'. Valid methods: app-balance, card, bank-transfer",
                        method
                    )
                })?;
                let draft = RemittanceDraft {
                    recipient,
                    amount_cents: parse_amount(&amount)?,
                    method,
                };
                run_send_command(&service, &user, draft, yes).await?;
            }

            Commands::Buy { amount, rate } => {
                let service = WalletService::connect(&self.database, config).await?;
                let txn = service
                    .buy_usdt(&user, parse_amount(&amount)?, parse_rate(rate)?)
                    .await?;
                print_receipt(&txn);
            }

            Commands::Sell { amount, rate } => {
                let service = WalletService::connect(&self.database, config).await?;
                let txn = service
                    .sell_usdt(&user, parse_amount(&amount)?, parse_rate(rate)?)
                    .await?;
                print_receipt(&txn);
            }

            Commands::Topup {
                amount,
                bank,
                reference,
            } => {
                let service = WalletService::connect(&self.database, config).await?;
                let txn = service
                    .top_up(&user, &bank, &reference, parse_amount(&amount)?)
                    .await?;
                print_receipt(&txn);
            }

            Commands::Qr(qr_cmd) => {
                let service = WalletService::connect(&self.database, config).await?;
                run_qr_command(&service, &user, qr_cmd).await?;
            }

            Commands::Referral(referral_cmd) => {
                let service = WalletService::connect(&self.database, config).await?;
                run_referral_command(&service, &user, referral_cmd).await?;
            }

            Commands::Receipt { id } => {
                let service = WalletService::connect(&self.database, config).await?;
                let txn = match id {
                    Some(id) => {
                        let id = Uuid::parse_str(&id)
                            .context("Invalid transaction ID format (expected UUID)")?;
                        service.get_transaction(&user, id).await?
                    }
                    None => service
                        .last_transaction(&user)
                        .await?
                        .context("No transactions yet")?,
                };
                print_receipt(&txn);
            }

            Commands::Analyze => {
                let service = WalletService::connect(&self.database, config).await?;
                let analysis = service
                    .analyze_expenses(&user, &SpendingAnalyzer::default())
                    .await?;
                println!("Summary:");
                println!("  {}", analysis.summary);
                println!();
                println!("Recommendations:");
                for line in analysis.recommendations.lines() {
                    println!("  - {}", line);
                }
            }

            Commands::Check => {
                let service = WalletService::connect(&self.database, config).await?;
                run_check_command(&service, &user).await?;
            }

            Commands::Export {
                export_type,
                output,
            } => {
                let service = WalletService::connect(&self.database, config).await?;
                run_export_command(&service, &user, &export_type, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

fn parse_amount(amount: &str) -> Result<i64> {
    parse_cents(amount).with_context(|| {
        format!("Invalid amount format '{}'. Use '50.00' or '50'", amount)
    })
}

fn parse_rate(rate: Option<String>) -> Result<Option<Rate>> {
    rate.map(|r| {
        r.parse::<Rate>()
            .with_context(|| format!("Invalid rate '{}'", r))
    })
    .transpose()
}

async fn run_balance_command(service: &WalletService, user: &str) -> Result<()> {
    let account = service.account(user).await?;
    let rate = service.config().reference_rate;

    println!("Account: {}", account.user_id);
    println!("{:<10} {:>16}", "CURRENCY", "BALANCE");
    println!("{}", "-".repeat(27));
    println!("{:<10} {:>16}", "USDT", format_cents(account.balances.stable));
    println!("{:<10} {:>16}", "BS", format_cents(account.balances.fiat));
    println!();
    println!("Reference rate: {} BS/USDT", rate);
    Ok(())
}

async fn run_history_command(service: &WalletService, user: &str, limit: Option<usize>) -> Result<()> {
    let transactions = service.history(user, limit).await?;

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<20} {:>16} DESCRIPTION",
        "DATE", "TYPE", "AMOUNT"
    );
    println!("{}", "-".repeat(80));
    for txn in &transactions {
        println!(
            "{:<12} {:<20} {:>16} {}",
            txn.timestamp.format("%Y-%m-%d"),
            txn.kind.label(),
            format_amount(txn.amount_cents, txn.currency),
            truncate(&txn.description, 30)
        );
    }
    Ok(())
}

async fn run_send_command(
    service: &WalletService,
    user: &str,
    draft: RemittanceDraft,
    confirmed: bool,
) -> Result<()> {
    let mut flow: Flow<RemittanceDraft, TransferResult> = Flow::new();
    flow.submit(draft)?;

    let draft = flow.draft().cloned().context("Transfer has no draft")?;
    let quote = service.quote_remittance(&draft)?;
    println!("Transfer to {}", draft.recipient);
    println!("  Method:          {}", draft.method.label());
    println!("  Amount sent:     {}", format_amount(quote.amount_sent, Currency::Usdt));
    println!("  Commission:      {}", format_amount(quote.commission, Currency::Usdt));
    println!(
        "  Amount received: {}",
        format_amount(quote.amount_received, Currency::Usdt)
    );

    if !confirmed {
        let draft = flow.back()?;
        println!();
        println!(
            "Transfer to {} not sent. Re-run with --yes to confirm.",
            draft.recipient
        );
        return Ok(());
    }

    let result = service.send_remittance(user, &draft).await?;
    flow.complete(result)?;

    if let Some(result) = flow.outcome() {
        println!();
        print_receipt(&result.sent);
        if result.received.is_some() {
            println!("  {} was credited in this wallet.", draft.recipient);
        }
    }
    Ok(())
}

async fn run_qr_command(service: &WalletService, user: &str, cmd: QrCommands) -> Result<()> {
    match cmd {
        QrCommands::Generate { amount } => {
            let amount_cents = parse_amount(&amount)?;
            let code = service.generate_qr(user, amount_cents)?;
            println!(
                "Scan to pay {} to {}:",
                format_amount(amount_cents, Currency::Usdt),
                user
            );
            println!("{}", code);
        }
        QrCommands::Pay { code } => {
            let result = service.pay_qr(user, &code).await?;
            print_receipt(&result.sent);
        }
    }
    Ok(())
}

async fn run_referral_command(
    service: &WalletService,
    user: &str,
    cmd: ReferralCommands,
) -> Result<()> {
    match cmd {
        ReferralCommands::Code => {
            let code = service.referral_code(user)?;
            println!("Your referral code: {}", code);
            println!(
                "Friends who redeem it get {bonus}, and you earn {bonus} for each of them.",
                bonus = format_amount(service.config().referral_bonus_cents, Currency::Usdt)
            );
        }
        ReferralCommands::Redeem { code } => {
            let result = service.redeem_referral(user, &code).await?;
            print_receipt(&result.bonus);
            if result.referrer.is_some() {
                println!("  The owner of {} was credited too.", code.trim().to_uppercase());
            }
        }
    }
    Ok(())
}

async fn run_check_command(service: &WalletService, user: &str) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity(user).await?;

    println!("Transactions: {}", report.transaction_count);
    println!("Balances:     {}", report.actual);
    match report.expected {
        Some(expected) => println!("From history: {}", expected),
        None => println!("From history: overflow"),
    }
    println!();

    if report.is_ok() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &WalletService,
    user: &str,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "history" => {
            let count = exporter.export_history_csv(user, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "snapshot" => {
            let snapshot = exporter.export_snapshot_json(user, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported account {}: {} transactions",
                    snapshot.account.user_id,
                    snapshot.transactions.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: history, snapshot",
                export_type
            );
        }
    }

    Ok(())
}

fn print_receipt(txn: &Transaction) {
    println!("Receipt: {}", txn.id);
    println!("  Sequence:    {}", txn.sequence);
    println!("  Date:        {}", txn.timestamp.format("%Y-%m-%d %H:%M:%S"));
    println!("  Type:        {}", txn.kind.label());
    println!("  Description: {}", txn.description);
    println!(
        "  Amount:      {}",
        format_amount(txn.amount_cents, txn.currency)
    );
    if let Some(usdt) = txn.usdt_used {
        println!("  USDT used:   {}", format_amount(usdt, Currency::Usdt));
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
