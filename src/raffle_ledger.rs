// Raffle Registry Program - Raffle ledger accounting and lifecycle
use std::fmt;

use solana_program::{hash::hashv, pubkey::Pubkey};

use crate::{
    constants::{MAX_RAFFLE_LENGTH, SOLO_REWARD_DOMAIN},
    raffle_error::RaffleError,
    raffle_state::{Raffle, RafflePaymentOption, RaffleReward, RngState, TicketHolder},
    vrf::winning_ticket_index,
};

/// Lifecycle of a raffle, derived from its record, the clock and its master's state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaffleState {
    /// Payment options and rewards being loaded
    Configuring,
    /// Selling tickets
    Started,
    /// Past its end date, waiting for randomness
    Closed,
    /// Randomness requested after close, not consumed yet
    Resolving,
    /// Winners assigned, assets still in the vault
    Resolved,
    /// Every reward redeemed and every payment option cashed out
    Settled,
    /// Settled and no longer indexed by its master raffle
    Removed,
}

/// Outcome of a successful ticket purchase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Purchase {
    /// Amount owed to the vault
    pub cost: u64,
    /// Tickets credited to the holder
    pub tickets: u8,
    pub payment_mint: Pubkey,
}

/// Amount of one payment asset released to the owner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CashOut {
    pub payment_mint: Pubkey,
    pub amount: u64,
}

impl Raffle {
    pub fn is_started(&self) -> bool {
        self.start_date != 0
    }

    pub fn is_closed(&self, now: u64) -> bool {
        self.is_started() && now >= self.end_date
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.payment_options.len() == self.payment_option_count as usize
            && self.rewards.len() == self.reward_count as usize
    }

    pub fn winners_assigned(&self) -> bool {
        self.rewards.iter().any(|r| r.winner.is_some())
    }

    /// True once every reward is redeemed and every payment option cashed out
    pub fn is_cleared(&self) -> bool {
        self.rewards.iter().all(|r| r.redeemed) && self.payment_options.iter().all(|p| p.cashed_out)
    }

    pub fn lifecycle(&self, now: u64, rng_state: Option<&RngState>, is_member: bool) -> RaffleState {
        if !is_member && self.is_cleared() {
            RaffleState::Removed
        } else if !self.is_started() {
            RaffleState::Configuring
        } else if now < self.end_date {
            RaffleState::Started
        } else if self.winners_assigned() {
            if self.is_cleared() {
                RaffleState::Settled
            } else {
                RaffleState::Resolved
            }
        } else if rng_state
            .map(|rng| rng.request_in_flight && rng.last_request_time >= self.end_date)
            .unwrap_or(false)
        {
            RaffleState::Resolving
        } else {
            RaffleState::Closed
        }
    }

    pub fn load_payment_option(&mut self, option: RafflePaymentOption) -> Result<(), RaffleError> {
        if self.is_started() {
            return Err(RaffleError::RaffleStarted);
        }
        if self.payment_options.len() >= self.payment_option_count as usize {
            return Err(RaffleError::TooManyPaymentOptions);
        }
        if option.price == 0 {
            return Err(RaffleError::NeedPaymentAmount);
        }
        if option.tickets_per_payment == 0 {
            return Err(RaffleError::NeedTicketsPerPayment);
        }
        if option.tickets_per_payment > self.max_tickets_per_holder {
            return Err(RaffleError::TooManyTicketsPerPayment);
        }

        self.payment_options.push(RafflePaymentOption {
            payment_tally: 0,
            cashed_out: false,
            ..option
        });
        Ok(())
    }

    pub fn load_reward(&mut self, reward: RaffleReward) -> Result<(), RaffleError> {
        if self.is_started() {
            return Err(RaffleError::RaffleStarted);
        }
        if self.rewards.len() >= self.reward_count as usize {
            return Err(RaffleError::TooManyRewards);
        }
        if reward.reward_amount == 0 {
            return Err(RaffleError::NeedRewardAmount);
        }

        self.rewards.push(RaffleReward {
            winner: None,
            redeemed: false,
            ..reward
        });
        Ok(())
    }

    /// Fix the sale window. Every configured option and reward must be loaded first.
    pub fn start(&mut self, end_date: u64, now: u64) -> Result<(), RaffleError> {
        if self.is_started() {
            return Err(RaffleError::RaffleStarted);
        }
        if !self.is_fully_loaded() {
            return Err(RaffleError::IncompleteConfiguration);
        }
        if end_date <= now {
            return Err(RaffleError::BadEndDate);
        }
        if end_date - now > MAX_RAFFLE_LENGTH {
            return Err(RaffleError::EndDateTooFar);
        }

        self.start_date = now;
        self.end_date = end_date;
        Ok(())
    }

    /// Credit `units` purchases through one payment option to `holder`.
    /// Nothing is written unless every check passes.
    pub fn record_purchase(
        &mut self,
        holder: &Pubkey,
        payment_option_index: u8,
        units: u8,
        now: u64,
    ) -> Result<Purchase, RaffleError> {
        if !self.is_started() {
            return Err(RaffleError::RaffleNotStarted);
        }
        if now >= self.end_date {
            return Err(RaffleError::RaffleEnded);
        }
        if *holder == self.owner {
            return Err(RaffleError::OwnerCannotBuy);
        }
        if units == 0 {
            return Err(RaffleError::NeedPurchaseUnits);
        }
        let option = self
            .payment_options
            .get(payment_option_index as usize)
            .ok_or(RaffleError::BadPaymentIndex)?;

        let granted = units as u16 * option.tickets_per_payment as u16;
        let position = self.holders.iter().position(|h| h.holder == *holder);
        let current = position.map(|i| self.holders[i].tickets as u16).unwrap_or(0);
        if current + granted > self.max_tickets_per_holder as u16 {
            return Err(RaffleError::BuyingTooMany);
        }
        if position.is_none() && self.holders.len() >= self.max_holder_count as usize {
            return Err(RaffleError::TooManyHolders);
        }

        let cost = (units as u64)
            .checked_mul(option.price)
            .ok_or(RaffleError::MathOverflow)?;
        let tally = option
            .payment_tally
            .checked_add(cost)
            .ok_or(RaffleError::MathOverflow)?;
        let payment_mint = option.payment_mint;

        // checks done, apply
        self.payment_options[payment_option_index as usize].payment_tally = tally;
        let tickets = (current + granted) as u8;
        match position {
            Some(i) => self.holders[i].tickets = tickets,
            None => self.holders.push(TicketHolder {
                holder: *holder,
                tickets,
            }),
        }

        Ok(Purchase {
            cost,
            tickets: granted as u8,
            payment_mint,
        })
    }

    /// Cash out one payment option together with every option sharing its mint,
    /// since they share one vault token account.
    pub fn record_cash_out(
        &mut self,
        payment_option_index: u8,
        now: u64,
    ) -> Result<CashOut, RaffleError> {
        if !self.is_started() {
            return Err(RaffleError::RaffleNotStarted);
        }
        if now < self.end_date {
            return Err(RaffleError::RaffleNotEnded);
        }
        let option = self
            .payment_options
            .get(payment_option_index as usize)
            .ok_or(RaffleError::BadPaymentIndex)?;
        if option.cashed_out {
            return Err(RaffleError::AlreadyCashedOut);
        }
        let payment_mint = option.payment_mint;

        let amount = self
            .payment_options
            .iter()
            .filter(|p| p.payment_mint == payment_mint && !p.cashed_out)
            .try_fold(0u64, |sum, p| sum.checked_add(p.payment_tally))
            .ok_or(RaffleError::MathOverflow)?;

        for option in self
            .payment_options
            .iter_mut()
            .filter(|p| p.payment_mint == payment_mint)
        {
            option.cashed_out = true;
        }

        Ok(CashOut {
            payment_mint,
            amount,
        })
    }

    /// Mark a reward redeemed by its winner, returning what leaves the vault
    pub fn record_redemption(
        &mut self,
        reward_index: u8,
        claimant: &Pubkey,
    ) -> Result<(Pubkey, u64), RaffleError> {
        let reward = self
            .rewards
            .get_mut(reward_index as usize)
            .ok_or(RaffleError::BadRewardIndex)?;
        let winner = reward.winner.ok_or(RaffleError::WinnerNotAssigned)?;
        if winner != *claimant {
            return Err(RaffleError::NotWinner);
        }
        if reward.redeemed {
            return Err(RaffleError::AlreadyRedeemed);
        }

        reward.redeemed = true;
        Ok((reward.reward_mint, reward.reward_amount))
    }

    /// Key that ties rewards into one basket. A zero group id is a standalone reward.
    pub fn reward_group_key(reward: &RaffleReward, reward_index: usize) -> [u8; 32] {
        if reward.group_id == Pubkey::default() {
            hashv(&[SOLO_REWARD_DOMAIN, &(reward_index as u32).to_le_bytes()]).to_bytes()
        } else {
            reward.group_id.to_bytes()
        }
    }

    /// Assign one winner per reward group from a fulfilled random value.
    /// With no tickets sold every reward goes back to the owner.
    pub fn assign_winners(&mut self, randomness: &[u8; 32], now: u64) -> Result<(), RaffleError> {
        if !self.is_closed(now) {
            return Err(RaffleError::RaffleNotEnded);
        }
        if self.winners_assigned() {
            return Err(RaffleError::WinnersAlreadyPicked);
        }

        let total = self.total_ticket_count();
        let mut resolved: Vec<([u8; 32], Pubkey)> = Vec::new();
        let mut winners = Vec::with_capacity(self.rewards.len());
        for (i, reward) in self.rewards.iter().enumerate() {
            let group_key = Self::reward_group_key(reward, i);
            let winner = match resolved.iter().find(|(key, _)| *key == group_key) {
                Some((_, winner)) => *winner,
                None => {
                    let winner = match winning_ticket_index(randomness, &self.raffle, &group_key, total)
                    {
                        Some(ticket) => self.holder_of_ticket(ticket).ok_or(RaffleError::MathOverflow)?,
                        None => self.owner,
                    };
                    resolved.push((group_key, winner));
                    winner
                }
            };
            winners.push(winner);
        }

        for (reward, winner) in self.rewards.iter_mut().zip(winners) {
            reward.winner = Some(winner);
        }
        Ok(())
    }

    /// Holder whose cumulative ticket range contains `ticket`
    pub fn holder_of_ticket(&self, ticket: u32) -> Option<Pubkey> {
        let mut start = 0u32;
        for holder in &self.holders {
            let end = start + holder.tickets as u32;
            if ticket < end {
                return Some(holder.holder);
            }
            start = end;
        }
        None
    }

    pub fn total_ticket_count(&self) -> u32 {
        self.holders.iter().map(|h| h.tickets as u32).sum()
    }

    pub fn holder_ticket_count(&self, holder: &Pubkey) -> u8 {
        self.holders
            .iter()
            .find(|h| h.holder == *holder)
            .map(|h| h.tickets)
            .unwrap_or(0)
    }

    /// Chance of `holder` winning any single reward group
    pub fn holder_odds(&self, holder: &Pubkey) -> f64 {
        let total = self.total_ticket_count();
        if total == 0 {
            return 0.0;
        }
        self.holder_ticket_count(holder) as f64 / total as f64
    }

    /// Checks the accounting invariants of the ledger: bounded tables, unique holders,
    /// per holder limits and tickets matching what the tallies paid for.
    pub fn invariants_hold(&self) -> bool {
        if self.payment_options.len() > self.payment_option_count as usize
            || self.rewards.len() > self.reward_count as usize
            || self.holders.len() > self.max_holder_count as usize
        {
            return false;
        }
        if self.is_started() && (!self.is_fully_loaded() || self.start_date >= self.end_date) {
            return false;
        }

        let mut keys: Vec<&Pubkey> = self.holders.iter().map(|h| &h.holder).collect();
        keys.sort();
        if keys.windows(2).any(|w| w[0] == w[1]) {
            return false;
        }
        if self
            .holders
            .iter()
            .any(|h| h.tickets > self.max_tickets_per_holder)
        {
            return false;
        }

        let paid_for: u64 = self
            .payment_options
            .iter()
            .map(|p| p.units_sold() * p.tickets_per_payment as u64)
            .sum();
        if paid_for != self.total_ticket_count() as u64 {
            return false;
        }

        // baskets resolve to a single winner
        self.rewards.iter().enumerate().all(|(i, reward)| {
            let key = Self::reward_group_key(reward, i);
            self.rewards
                .iter()
                .enumerate()
                .filter(|(j, other)| Self::reward_group_key(other, *j) == key)
                .all(|(_, other)| other.winner == reward.winner)
        })
    }
}

impl fmt::Display for Raffle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Raffle \"{}\" ({})", self.name(), self.raffle)?;
        writeln!(f, "  master: {}", self.master_raffle)?;
        writeln!(f, "  owner: {}", self.owner)?;
        writeln!(f, "  vault: {} (nonce {})", self.vault, self.nonce)?;
        writeln!(f, "  rng bot: {}", self.rng_bot)?;
        writeln!(f, "  start: {} end: {}", self.start_date, self.end_date)?;
        writeln!(
            f,
            "  tickets: {} across {}/{} holders, max {} each",
            self.total_ticket_count(),
            self.holders.len(),
            self.max_holder_count,
            self.max_tickets_per_holder
        )?;
        writeln!(
            f,
            "  payment options ({}/{}):",
            self.payment_options.len(),
            self.payment_option_count
        )?;
        for (i, option) in self.payment_options.iter().enumerate() {
            writeln!(
                f,
                "    [{}] {}: {} of {} for {} tickets, tally {}{}",
                i,
                option.name(),
                option.price,
                option.payment_mint,
                option.tickets_per_payment,
                option.payment_tally,
                if option.cashed_out { ", cashed out" } else { "" }
            )?;
        }
        writeln!(f, "  rewards ({}/{}):", self.rewards.len(), self.reward_count)?;
        for (i, reward) in self.rewards.iter().enumerate() {
            let winner = reward
                .winner
                .map(|w| w.to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "    [{}] {}: {} of {}, group {}, winner {}{}",
                i,
                reward.name(),
                reward.reward_amount,
                reward.reward_mint,
                reward.group_id,
                winner,
                if reward.redeemed { ", redeemed" } else { "" }
            )?;
        }
        for holder in &self.holders {
            writeln!(
                f,
                "  holder {}: {} tickets ({:.2}%)",
                holder.holder,
                holder.tickets,
                self.holder_odds(&holder.holder) * 100.0
            )?;
        }
        Ok(())
    }
}
