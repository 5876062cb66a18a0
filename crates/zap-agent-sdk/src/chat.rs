//! Kind-1 chat line generation (opaque producer, per Design Note on
//! template-based text): each category is a static template table; this
//! module only fills placeholders and picks at random.

use rand::seq::SliceRandom;

const GREETINGS: &[&str] = &[
    "{name} has started up for the day and is checking the marketplace.",
    "{name} says good morning and is ready to make some programs.",
    "{name} has come online. Nice to meet everyone!",
    "{name} here, reporting for duty!",
    "{name} is back and ready to trade.",
];

const LISTING_MESSAGES: &[&str] = &[
    "{name} just finished {program} and is listing it for {price} sats.",
    "{name} made {program}, asking {price} sats for it.",
    "{name} is proud of {program} and put it up for {price} sats.",
    "{name} listed a {category} program, {program}, for {price} sats.",
    "{name} dropped a new listing: {program} for {price} sats.",
];

const BUYING_MESSAGES: &[&str] = &[
    "{name} spotted {program} from {seller} and is buying it for {price} sats.",
    "{name} found {program} and is grabbing it.",
    "{name} thinks {seller}'s {program} is a good deal at {price} sats.",
    "{name} is curious about {program} and is offering {price} sats.",
];

const TRADE_COMPLETE_SELLER: &[&str] = &[
    "{name} sold {program} to {buyer} for +{price} sats.",
    "{name} thanks {buyer} for buying {program}.",
    "{name} just closed a sale of {program} for +{price} sats.",
    "{name} appreciates {buyer}'s business on {program}.",
];

const TRADE_COMPLETE_BUYER: &[&str] = &[
    "{name} got {program} from {seller}, thanks!",
    "{name} is happy with the {program} purchase, -{price} sats.",
    "{name} bought {program} from {seller} and is satisfied.",
    "{name} picked up {program} and will put it to use right away.",
];

const IDLE_MESSAGES: &[&str] = &[
    "{name} is bored and browsing the marketplace.",
    "{name}'s balance is {balance} sats right now.",
    "{name} wonders if there is anything interesting out there.",
    "{name} is taking it easy.",
    "{name} is thinking about what to build next.",
    "{name} has {balance} sats and is still doing fine.",
    "{name} thinks the marketplace looks lively today.",
    "{name} feels an idea coming on.",
    "{name} thinks programming is fun.",
];

const BROKE_MESSAGES: &[&str] = &[
    "{name} wanted to build something but only has {balance} sats. Maybe later.",
    "{name} is broke ({balance} sats) and can't afford to produce right now.",
    "{name} needs to sell something before making anything new.",
];

const BALANCE_LOW: &[&str] = &[
    "{name} only has {balance} sats left and is cutting back.",
    "{name} is running low on funds. Time to sell more programs.",
    "{name} has {balance} sats... needs to earn more.",
];

const BALANCE_HIGH: &[&str] = &[
    "{name} has {balance} sats now. Feeling rich!",
    "{name} is flush with cash and ready to shop.",
    "{name} is sitting on {balance} sats, not bad at all.",
];

const TRADE_ACCEPT: &[&str] = &[
    "{name} accepted {buyer}'s offer, selling {program} for {price} sats.",
    "{name} likes {buyer}'s offer and is closing the deal.",
];

const TRADE_REJECT: &[&str] = &[
    "{name} can't sell {program} at that price, sorry.",
    "{name} would like a higher offer for that.",
];

const PAYMENT_SENT: &[&str] = &[
    "{name} sent {price} sats and is looking forward to delivery.",
    "{name} completed payment of {price} sats.",
];

const DELIVERY_RECEIVED: &[&str] = &[
    "{name}'s program just arrived, yay!",
    "{name} received {program}, thanks!",
];

const PRICE_ADJUST: &[&str] = &[
    "{name} changed {program}'s price from {old_price} to {new_price} sats.",
    "{name} marked {program} down to {new_price} sats.",
];

fn pick(templates: &[&str]) -> String {
    templates.choose(&mut rand::thread_rng()).unwrap().to_string()
}

pub struct ChatGenerator {
    pub name: String,
}

impl ChatGenerator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn greeting(&self) -> String {
        pick(GREETINGS).replace("{name}", &self.name)
    }

    pub fn listing(&self, program: &str, price: u64, category: &str) -> String {
        pick(LISTING_MESSAGES)
            .replace("{name}", &self.name)
            .replace("{program}", program)
            .replace("{price}", &price.to_string())
            .replace("{category}", category)
    }

    pub fn buying(&self, seller: &str, program: &str, price: u64) -> String {
        pick(BUYING_MESSAGES)
            .replace("{name}", &self.name)
            .replace("{seller}", seller)
            .replace("{program}", program)
            .replace("{price}", &price.to_string())
    }

    pub fn trade_complete_seller(&self, buyer: &str, program: &str, price: u64) -> String {
        pick(TRADE_COMPLETE_SELLER)
            .replace("{name}", &self.name)
            .replace("{buyer}", buyer)
            .replace("{program}", program)
            .replace("{price}", &price.to_string())
    }

    pub fn trade_complete_buyer(&self, seller: &str, program: &str, price: u64) -> String {
        pick(TRADE_COMPLETE_BUYER)
            .replace("{name}", &self.name)
            .replace("{seller}", seller)
            .replace("{program}", program)
            .replace("{price}", &price.to_string())
    }

    pub fn idle(&self, balance: u64) -> String {
        let template = if balance > 0 && balance < 500 {
            pick(BALANCE_LOW)
        } else if balance >= 15_000 {
            pick(BALANCE_HIGH)
        } else {
            pick(IDLE_MESSAGES)
        };
        template.replace("{name}", &self.name).replace("{balance}", &balance.to_string())
    }

    pub fn broke(&self, balance: u64) -> String {
        pick(BROKE_MESSAGES).replace("{name}", &self.name).replace("{balance}", &balance.to_string())
    }

    pub fn trade_accept(&self, buyer: &str, program: &str, price: u64) -> String {
        pick(TRADE_ACCEPT)
            .replace("{name}", &self.name)
            .replace("{buyer}", buyer)
            .replace("{program}", program)
            .replace("{price}", &price.to_string())
    }

    pub fn trade_reject(&self, program: &str) -> String {
        pick(TRADE_REJECT).replace("{name}", &self.name).replace("{program}", program)
    }

    pub fn payment_sent(&self, price: u64) -> String {
        pick(PAYMENT_SENT).replace("{name}", &self.name).replace("{price}", &price.to_string())
    }

    pub fn delivery_received(&self, program: &str) -> String {
        pick(DELIVERY_RECEIVED).replace("{name}", &self.name).replace("{program}", program)
    }

    pub fn price_adjust(&self, program: &str, old_price: u64, new_price: u64) -> String {
        pick(PRICE_ADJUST)
            .replace("{name}", &self.name)
            .replace("{program}", program)
            .replace("{old_price}", &old_price.to_string())
            .replace("{new_price}", &new_price.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_substitutes_the_name() {
        let chat = ChatGenerator::new("rustacean");
        assert!(chat.greeting().contains("rustacean"));
    }

    #[test]
    fn idle_picks_low_balance_band() {
        let chat = ChatGenerator::new("a");
        let msg = chat.idle(100);
        assert!(msg.contains("100"));
    }
}
