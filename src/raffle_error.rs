use solana_program::{
    decode_error::DecodeError, msg, program_error::PrintProgramError, program_error::ProgramError,
};
use thiserror::Error;

/// Broad class of a rejected operation, used by callers to decide whether to retry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any mutation; retry with corrected input
    Validation,
    /// Wrong owner, winner or bot identity; never retried automatically
    Authorization,
    /// Operation invalid for the raffle's current lifecycle state
    State,
    /// Oracle side precondition not met; retry after remediation
    ExternalService,
    /// Vault address derivation failed; fatal
    Derivation,
}

/// Errors that may be returned by the Raffle program
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RaffleError {
    // Validation
    #[error("Name too long, max 64 bytes")]
    NameTooLong,
    #[error("A master raffle needs at least 1 raffle slot")]
    NeedRaffleSlots,
    #[error("Too many raffle slots requested")]
    TooManyRaffleSlots,
    #[error("Master raffle has no free raffle slot")]
    MasterRaffleFull,
    #[error("Need at least 1 payment option")]
    NeedPaymentOption,
    #[error("Need at least 1 reward")]
    NeedReward,
    #[error("Need at least 1 holder slot")]
    NeedHolders,
    #[error("Tickets per payment cannot exceed max tickets per holder")]
    TooManyTicketsPerPayment,
    #[error("Tickets per payment must be at least 1")]
    NeedTicketsPerPayment,
    #[error("Payment amount must be at least 1")]
    NeedPaymentAmount,
    #[error("All payment options are already loaded")]
    TooManyPaymentOptions,
    #[error("Reward amount must be at least 1")]
    NeedRewardAmount,
    #[error("Owner does not hold enough of the reward")]
    InsufficientRewardBalance,
    #[error("All rewards are already loaded")]
    TooManyRewards,
    #[error("Payment options and rewards must all be loaded before starting")]
    IncompleteConfiguration,
    #[error("End date must be later than the current time")]
    BadEndDate,
    #[error("End date cannot be more than 3 years away")]
    EndDateTooFar,
    #[error("Payment option index out of bounds")]
    BadPaymentIndex,
    #[error("Reward index out of bounds")]
    BadRewardIndex,
    #[error("Must purchase at least 1 unit")]
    NeedPurchaseUnits,
    #[error("Buying would overflow the holder table")]
    TooManyHolders,
    #[error("Buying would exceed the tickets allowed per holder")]
    BuyingTooMany,
    #[error("Token account mint does not match")]
    BadMint,
    #[error("Not enough tokens to buy")]
    NotEnoughToBuy,
    #[error("Account does not match the expected address")]
    AccountMismatch,
    #[error("Vault holds less than the recorded tally")]
    VaultBalanceMismatch,
    #[error("Arithmetic overflow")]
    MathOverflow,
    #[error("Max tickets per holder must be at least 1")]
    NeedTicketsPerHolder,

    // Authorization
    #[error("Only the raffle owner can perform this action")]
    NotRaffleOwner,
    #[error("Only the master raffle owner can perform this action")]
    NotMasterOwner,
    #[error("Only the assigned winner can redeem this reward")]
    NotWinner,
    #[error("Only the owner or the RNG bot can drive randomness")]
    NotRngAuthority,
    #[error("Owner cannot buy tickets")]
    OwnerCannotBuy,

    // State
    #[error("Raffle has started")]
    RaffleStarted,
    #[error("Raffle has not started")]
    RaffleNotStarted,
    #[error("Raffle has ended")]
    RaffleEnded,
    #[error("Raffle has not ended")]
    RaffleNotEnded,
    #[error("Payment option already cashed out")]
    AlreadyCashedOut,
    #[error("Reward already redeemed")]
    AlreadyRedeemed,
    #[error("Reward has no winner yet")]
    WinnerNotAssigned,
    #[error("Winners were already picked")]
    WinnersAlreadyPicked,
    #[error("Raffle is not cleared")]
    RaffleNotCleared,
    #[error("Raffle is not a member of this master raffle")]
    RaffleNotMember,
    #[error("Raffle must be removed from its master raffle first")]
    RaffleStillMember,
    #[error("A randomness request is already in flight")]
    RngRequestInFlight,
    #[error("Randomness was requested before the raffle ended, request more")]
    StaleRandomness,

    // External service
    #[error("VRF account is not a valid binding of the oracle")]
    BadVrfAccount,
    #[error("Oracle queue or escrow does not match the VRF account")]
    OracleAccountMismatch,
    #[error("Oracle queue permission has not been granted")]
    MissingOraclePermission,
    #[error("Fee vault does not exist, wrap SOL into the requester's associated token account")]
    FeeVaultMissing,
    #[error("Fee vault needs at least 0.1 wrapped SOL, fund the fee vault")]
    InsufficientFeeBalance,
    #[error("Randomness has not been fulfilled yet")]
    RandomnessNotFulfilled,

    // Derivation
    #[error("No valid vault address for this raffle")]
    VaultDerivationExhausted,
    #[error("Vault nonce does not derive the stored vault")]
    BadVaultNonce,
}

impl RaffleError {
    pub fn kind(&self) -> ErrorKind {
        use RaffleError::*;
        match self {
            NameTooLong | NeedRaffleSlots | TooManyRaffleSlots | MasterRaffleFull
            | NeedPaymentOption | NeedReward | NeedHolders | TooManyTicketsPerPayment
            | NeedTicketsPerPayment | NeedPaymentAmount | TooManyPaymentOptions
            | NeedRewardAmount | InsufficientRewardBalance | TooManyRewards
            | IncompleteConfiguration | BadEndDate | EndDateTooFar | BadPaymentIndex
            | BadRewardIndex | NeedPurchaseUnits | TooManyHolders | BuyingTooMany | BadMint
            | NotEnoughToBuy | AccountMismatch | VaultBalanceMismatch | MathOverflow
            | NeedTicketsPerHolder => ErrorKind::Validation,
            NotRaffleOwner | NotMasterOwner | NotWinner | NotRngAuthority | OwnerCannotBuy => {
                ErrorKind::Authorization
            }
            RaffleStarted | RaffleNotStarted | RaffleEnded | RaffleNotEnded | AlreadyCashedOut
            | AlreadyRedeemed | WinnerNotAssigned | WinnersAlreadyPicked | RaffleNotCleared
            | RaffleNotMember | RaffleStillMember | RngRequestInFlight | StaleRandomness => {
                ErrorKind::State
            }
            BadVrfAccount | OracleAccountMismatch | MissingOraclePermission | FeeVaultMissing
            | InsufficientFeeBalance | RandomnessNotFulfilled => ErrorKind::ExternalService,
            VaultDerivationExhausted | BadVaultNonce => ErrorKind::Derivation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::ExternalService)
    }
}

impl From<RaffleError> for ProgramError {
    fn from(e: RaffleError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl<T> DecodeError<T> for RaffleError {
    fn type_of() -> &'static str {
        "Raffle Error"
    }
}

impl PrintProgramError for RaffleError {
    fn print<E>(&self) {
        msg!(&self.to_string());
    }
}
