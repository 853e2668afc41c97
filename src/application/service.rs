use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::WalletConfig;
use crate::domain::{
    bill_payment, build_integrity_report, card_charge, exchange_buy, exchange_sell,
    prepare_transaction, qr_payment, qr_payment_received, quote_remittance, referral_bonus,
    referral_earned, remittance, remittance_received, top_up, validate_user_id, Account, AnalysisEntry, Balances,
    Biller, Cents, ExpenseAnalysis, ExpenseAnalyzer, IntegrityReport, Ledger, OperationError,
    Proposal, QrPayload, Rate, ReferralCode, RemittanceDraft, RemittanceQuote, Transaction,
    TransactionId, TransactionKind,
};
use crate::storage::{CommitOutcome, PendingEntry, Repository};

use super::AppError;

/// Application service providing the wallet operations.
/// This is the primary interface for any client (CLI, tests, etc.).
/// Every balance change goes through the transaction processor and is
/// written together with its transaction.
pub struct WalletService {
    repo: Repository,
    config: WalletConfig,
}

/// Result of a transfer whose recipient may also hold an account here
pub struct TransferResult {
    pub sent: Transaction,
    /// Recipient's side, when the recipient has an account in this database
    pub received: Option<Transaction>,
}

/// Result of redeeming a referral code
pub struct ReferralResult {
    /// Welcome bonus credited to the account redeeming the code
    pub bonus: Transaction,
    /// Credit for the code's owner, when the owner has an account in this database
    pub referrer: Option<Transaction>,
}

impl WalletService {
    /// Create a new wallet service with the given repository.
    pub fn new(repo: Repository, config: WalletConfig) -> Self {
        Self { repo, config }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, config: WalletConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url, Self::busy_timeout(&config)).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: WalletConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url, Self::busy_timeout(&config)).await?;
        Ok(Self::new(repo, config))
    }

    fn busy_timeout(config: &WalletConfig) -> Duration {
        Duration::from_millis(config.busy_timeout_ms)
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    // ========================
    // Accounts
    // ========================

    /// Open an account with the given opening balances and no history.
    pub async fn open_account(&self, user_id: &str, opening: Balances) -> Result<Account, AppError> {
        let account = Account::new(user_id, opening)?;
        self.ensure_absent(&account.user_id).await?;

        self.repo.create_account(&account, &[]).await?;
        info!(user_id = %account.user_id, balances = %account.balances, "account opened");
        Ok(account)
    }

    /// Open an account seeded with the demo balances and history.
    pub async fn seed_demo(&self, user_id: &str) -> Result<Account, AppError> {
        let ledger = Ledger::demo();
        let mut account = Account::new(user_id, ledger.opening())?;
        account.balances = ledger.balances();
        self.ensure_absent(&account.user_id).await?;

        let mut history: Vec<Transaction> = ledger.history().cloned().collect();
        history.reverse();
        self.repo.create_account(&account, &history).await?;
        info!(
            user_id = %account.user_id,
            balances = %account.balances,
            transactions = history.len(),
            "demo account seeded"
        );
        Ok(account)
    }

    async fn ensure_absent(&self, user_id: &str) -> Result<(), AppError> {
        if self.repo.get_account(user_id).await?.is_some() {
            return Err(AppError::AccountAlreadyExists(user_id.to_string()));
        }
        Ok(())
    }

    pub async fn account(&self, user_id: &str) -> Result<Account, AppError> {
        let account = self
            .repo
            .get_account(user_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(user_id.to_string()))?;
        debug!(user_id, balances = %account.balances, "balances read");
        Ok(account)
    }

    pub async fn balances(&self, user_id: &str) -> Result<Balances, AppError> {
        Ok(self.account(user_id).await?.balances)
    }

    /// Transaction history, newest first.
    pub async fn history(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, AppError> {
        self.account(user_id).await?;
        Ok(self.repo.list_transactions(user_id, limit).await?)
    }

    /// Most recent transaction, shown as the receipt of the last operation.
    pub async fn last_transaction(&self, user_id: &str) -> Result<Option<Transaction>, AppError> {
        Ok(self.history(user_id, Some(1)).await?.into_iter().next())
    }

    pub async fn get_transaction(
        &self,
        user_id: &str,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        self.repo
            .get_transaction(user_id, id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(id.to_string()))
    }

    // ========================
    // Operations
    // ========================

    /// Card purchase priced in BS, paid from the stable balance at the reference rate.
    pub async fn charge_card(
        &self,
        user_id: &str,
        merchant: &str,
        fiat_amount: Cents,
    ) -> Result<Transaction, AppError> {
        let rate = self.config.reference_rate;
        let entry = self
            .prepare(user_id, |current| card_charge(current, merchant, fiat_amount, rate))
            .await?;
        self.commit_one(entry).await
    }

    pub async fn pay_bill(
        &self,
        user_id: &str,
        biller: Biller,
        reference: &str,
        amount: Cents,
    ) -> Result<Transaction, AppError> {
        let rate = self.config.reference_rate;
        let entry = self
            .prepare(user_id, |current| {
                bill_payment(current, biller, reference, amount, rate)
            })
            .await?;
        self.commit_one(entry).await
    }

    /// Figures for the confirmation step of a transfer.
    pub fn quote_remittance(&self, draft: &RemittanceDraft) -> Result<RemittanceQuote, AppError> {
        Ok(quote_remittance(draft)?)
    }

    /// Send a remittance. A recipient with an account here is credited in the
    /// same write.
    pub async fn send_remittance(
        &self,
        user_id: &str,
        draft: &RemittanceDraft,
    ) -> Result<TransferResult, AppError> {
        let quote = self.quote_remittance(draft)?;
        let recipient = draft.recipient.trim();
        if recipient == user_id.trim() {
            return Err(AppError::InvalidInput(
                "You cannot send money to yourself".to_string(),
            ));
        }

        let sent = self
            .prepare(user_id, |current| remittance(current, draft))
            .await?;
        let received = self
            .prepare_counterparty(recipient, |current| {
                remittance_received(current, user_id, quote.amount_received)
            })
            .await?;
        self.commit_transfer(sent, received).await
    }

    /// Buy USDT with BS at an auction rate, the reference rate when none is given.
    pub async fn buy_usdt(
        &self,
        user_id: &str,
        fiat_amount: Cents,
        rate: Option<Rate>,
    ) -> Result<Transaction, AppError> {
        let rate = rate.unwrap_or(self.config.reference_rate);
        let band = self.config.band()?;
        let entry = self
            .prepare(user_id, |current| exchange_buy(current, fiat_amount, rate, band))
            .await?;
        self.commit_one(entry).await
    }

    /// Sell USDT for BS at an auction rate, the reference rate when none is given.
    pub async fn sell_usdt(
        &self,
        user_id: &str,
        stable_amount: Cents,
        rate: Option<Rate>,
    ) -> Result<Transaction, AppError> {
        let rate = rate.unwrap_or(self.config.reference_rate);
        let band = self.config.band()?;
        let entry = self
            .prepare(user_id, |current| {
                exchange_sell(current, stable_amount, rate, band)
            })
            .await?;
        self.commit_one(entry).await
    }

    pub async fn top_up(
        &self,
        user_id: &str,
        bank: &str,
        reference: &str,
        amount: Cents,
    ) -> Result<Transaction, AppError> {
        let entry = self
            .prepare(user_id, |current| top_up(current, bank, reference, amount))
            .await?;
        self.commit_one(entry).await
    }

    /// Encoded QR code asking others to pay `amount` USDT to this user.
    pub fn generate_qr(&self, user_id: &str, amount: Cents) -> Result<String, AppError> {
        let user_id = validate_user_id(user_id)?;
        if amount <= 0 {
            return Err(OperationError::InvalidAmount(amount).into());
        }
        Ok(QrPayload::new(user_id, amount).encode()?)
    }

    /// Pay a scanned QR code. A malformed code fails before any balance is read.
    pub async fn pay_qr(&self, user_id: &str, encoded: &str) -> Result<TransferResult, AppError> {
        let payload = QrPayload::decode(encoded).inspect_err(|err| {
            warn!(user_id, %err, "QR code rejected");
        })?;
        if payload.user_id == user_id.trim() {
            return Err(AppError::InvalidInput(
                "You cannot pay your own QR code".to_string(),
            ));
        }

        let sent = self
            .prepare(user_id, |current| qr_payment(current, &payload))
            .await?;
        let received = self
            .prepare_counterparty(&payload.user_id, |current| {
                qr_payment_received(current, user_id, payload.amount_cents)
            })
            .await?;
        self.commit_transfer(sent, received).await
    }

    /// This user's own referral code.
    pub fn referral_code(&self, user_id: &str) -> Result<ReferralCode, AppError> {
        Ok(ReferralCode::for_user(&validate_user_id(user_id)?))
    }

    /// Redeem someone else's referral code for the welcome bonus, once per account.
    /// The code's owner, when it has an account here, earns the same bonus in
    /// the same write.
    pub async fn redeem_referral(
        &self,
        user_id: &str,
        code: &str,
    ) -> Result<ReferralResult, AppError> {
        let code = ReferralCode::parse(code)?;
        if code == self.referral_code(user_id)? {
            return Err(AppError::InvalidInput(
                "You cannot redeem your own referral code".to_string(),
            ));
        }
        let account = self.account(user_id).await?;
        if self.already_redeemed(&account.user_id).await? {
            return Err(AppError::ReferralAlreadyRedeemed(account.user_id));
        }

        let bonus = self.config.referral_bonus_cents;
        let welcome = self
            .prepare(&account.user_id, |current| {
                referral_bonus(current, &code, bonus)
            })
            .await?;
        let earned = match self.find_referrer(&code, &account.user_id).await? {
            Some(referrer) => Some(
                self.prepare(&referrer, |current| {
                    referral_earned(current, &account.user_id, bonus)
                })
                .await?,
            ),
            None => None,
        };

        match self.commit_pair(welcome, earned).await {
            Ok((bonus, referrer)) => Ok(ReferralResult { bonus, referrer }),
            Err(AppError::StaleBalance(user)) => {
                // A concurrent redemption may have won the race
                if self.already_redeemed(&account.user_id).await? {
                    Err(AppError::ReferralAlreadyRedeemed(account.user_id))
                } else {
                    Err(AppError::StaleBalance(user))
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn already_redeemed(&self, user_id: &str) -> Result<bool, AppError> {
        Ok(self
            .repo
            .has_transaction_kind(user_id, TransactionKind::ReferralBonus)
            .await?)
    }

    /// Local account owning `code`, other than the one redeeming it.
    async fn find_referrer(
        &self,
        code: &ReferralCode,
        redeemer: &str,
    ) -> Result<Option<String>, AppError> {
        let referrer = self
            .repo
            .list_user_ids()
            .await?
            .into_iter()
            .find(|id| id != redeemer && ReferralCode::for_user(id) == *code);
        debug!(code = %code, referrer = ?referrer, "referral code resolved");
        Ok(referrer)
    }

    // ========================
    // Analysis and integrity
    // ========================

    /// Hand the history to an expense analyzer.
    pub async fn analyze_expenses<A: ExpenseAnalyzer>(
        &self,
        user_id: &str,
        analyzer: &A,
    ) -> Result<ExpenseAnalysis, AppError> {
        let entries: Vec<AnalysisEntry> = self
            .history(user_id, None)
            .await?
            .iter()
            .map(AnalysisEntry::from)
            .collect();

        match analyzer.analyze(&entries).await {
            Ok(analysis) => {
                info!(user_id, entries = entries.len(), "expenses analyzed");
                Ok(analysis)
            }
            Err(err) => {
                warn!(user_id, %err, "expense analysis failed");
                Err(err.into())
            }
        }
    }

    /// Check that balances equal the opening balances plus every recorded change.
    pub async fn check_integrity(&self, user_id: &str) -> Result<IntegrityReport, AppError> {
        let account = self.account(user_id).await?;
        let history = self.repo.load_history(user_id).await?;
        Ok(build_integrity_report(
            account.opening,
            account.balances,
            &history,
        ))
    }

    // ========================
    // Processing
    // ========================

    /// Read the account, compute the proposal and run it through the processor.
    async fn prepare<F>(&self, user_id: &str, propose: F) -> Result<PendingEntry, AppError>
    where
        F: FnOnce(Balances) -> Result<Proposal, OperationError>,
    {
        let account = self.account(user_id).await?;
        let current = account.balances;

        let proposal = propose(current).inspect_err(|err| {
            warn!(user_id, %err, "operation rejected");
        })?;
        let transaction = prepare_transaction(current, proposal, Utc::now()).inspect_err(|err| {
            warn!(user_id, %err, "operation rejected");
        })?;

        Ok(PendingEntry {
            user_id: account.user_id,
            expected: current,
            transaction,
        })
    }

    /// Like [`Self::prepare`], but a missing account means there is nothing to credit.
    async fn prepare_counterparty<F>(
        &self,
        user_id: &str,
        propose: F,
    ) -> Result<Option<PendingEntry>, AppError>
    where
        F: FnOnce(Balances) -> Result<Proposal, OperationError>,
    {
        if self.repo.get_account(user_id).await?.is_none() {
            debug!(user_id, "counterparty has no local account");
            return Ok(None);
        }
        Ok(Some(self.prepare(user_id, propose).await?))
    }

    async fn commit_one(&self, entry: PendingEntry) -> Result<Transaction, AppError> {
        let mut committed = self.commit(vec![entry]).await?;
        committed
            .pop()
            .ok_or_else(|| AppError::RemoteWrite(anyhow::anyhow!("No transaction was written")))
    }

    async fn commit_transfer(
        &self,
        sent: PendingEntry,
        received: Option<PendingEntry>,
    ) -> Result<TransferResult, AppError> {
        let (sent, received) = self.commit_pair(sent, received).await?;
        Ok(TransferResult { sent, received })
    }

    /// Commit an entry and, when present, its counterpart in one write.
    async fn commit_pair(
        &self,
        first: PendingEntry,
        second: Option<PendingEntry>,
    ) -> Result<(Transaction, Option<Transaction>), AppError> {
        let mut entries = vec![first];
        entries.extend(second);

        let mut committed = self.commit(entries).await?.into_iter();
        let first = committed
            .next()
            .ok_or_else(|| AppError::RemoteWrite(anyhow::anyhow!("No transaction was written")))?;
        Ok((first, committed.next()))
    }

    async fn commit(&self, entries: Vec<PendingEntry>) -> Result<Vec<Transaction>, AppError> {
        match self.repo.commit(&entries).await {
            Ok(CommitOutcome::Committed(transactions)) => {
                for (entry, txn) in entries.iter().zip(&transactions) {
                    info!(
                        user_id = %entry.user_id,
                        kind = txn.kind.as_str(),
                        amount = txn.amount_cents,
                        currency = %txn.currency,
                        sequence = txn.sequence,
                        "transaction committed"
                    );
                }
                Ok(transactions)
            }
            Ok(CommitOutcome::Stale(user_id)) => {
                warn!(%user_id, "balances changed during the operation");
                Err(AppError::StaleBalance(user_id))
            }
            Ok(CommitOutcome::Duplicate { user_id, kind }) => {
                warn!(%user_id, kind = kind.as_str(), "duplicate transaction rejected");
                Err(duplicate_error(user_id, kind))
            }
            Err(err) => {
                warn!(error = %err, "write failed");
                Err(AppError::RemoteWrite(err))
            }
        }
    }
}

fn duplicate_error(user_id: String, kind: TransactionKind) -> AppError {
    match kind {
        TransactionKind::ReferralBonus => AppError::ReferralAlreadyRedeemed(user_id),
        _ => AppError::RemoteWrite(anyhow::anyhow!(
            "Duplicate {} transaction for {}",
            kind.as_str(),
            user_id
        )),
    }
}
