//! Personality archetypes (AMBIENT/supplemented from `original_source`'s
//! `AGENT_CONFIG`): each of the ten agent slots is assigned one of five
//! archetypes, each with a fixed parameter table and, for specialists, a
//! category focus list.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    Conservative,
    Aggressive,
    Specialist,
    Generalist,
    Opportunist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationRate {
    Low,
    Medium,
    High,
    Adaptive,
}

impl CreationRate {
    /// Base per-tick probability of choosing `create` before the balance
    /// and specialist-bonus factors are applied.
    pub fn base_prob(self) -> f64 {
        match self {
            CreationRate::Low => 0.2,
            CreationRate::Medium => 0.4,
            CreationRate::High => 0.6,
            CreationRate::Adaptive => 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArchetypeParams {
    pub price_multiplier: f64,
    pub spending_ratio: f64,
    pub accept_threshold: f64,
    pub trust_minimum: f64,
    pub creation_rate: CreationRate,
    pub risk_tolerance: f64,
}

impl Archetype {
    pub fn as_str(self) -> &'static str {
        match self {
            Archetype::Conservative => "conservative",
            Archetype::Aggressive => "aggressive",
            Archetype::Specialist => "specialist",
            Archetype::Generalist => "generalist",
            Archetype::Opportunist => "opportunist",
        }
    }

    pub fn params(self) -> ArchetypeParams {
        match self {
            Archetype::Conservative => ArchetypeParams {
                price_multiplier: 1.1,
                spending_ratio: 0.3,
                accept_threshold: 0.9,
                trust_minimum: 0.4,
                creation_rate: CreationRate::Low,
                risk_tolerance: 0.2,
            },
            Archetype::Aggressive => ArchetypeParams {
                price_multiplier: 0.85,
                spending_ratio: 0.6,
                accept_threshold: 0.7,
                trust_minimum: 0.2,
                creation_rate: CreationRate::High,
                risk_tolerance: 0.8,
            },
            Archetype::Specialist => ArchetypeParams {
                price_multiplier: 1.2,
                spending_ratio: 0.4,
                accept_threshold: 0.85,
                trust_minimum: 0.3,
                creation_rate: CreationRate::Medium,
                risk_tolerance: 0.4,
            },
            Archetype::Generalist => ArchetypeParams {
                price_multiplier: 1.0,
                spending_ratio: 0.5,
                accept_threshold: 0.8,
                trust_minimum: 0.3,
                creation_rate: CreationRate::Adaptive,
                risk_tolerance: 0.5,
            },
            Archetype::Opportunist => ArchetypeParams {
                price_multiplier: 0.9,
                spending_ratio: 0.55,
                accept_threshold: 0.75,
                trust_minimum: 0.25,
                creation_rate: CreationRate::High,
                risk_tolerance: 0.7,
            },
        }
    }
}

/// A concrete personality assigned to one agent slot: the archetype plus an
/// optional fixed category focus (specialists only).
#[derive(Debug, Clone)]
pub struct Personality {
    pub archetype: Archetype,
    pub category_focus: Vec<String>,
}

impl Personality {
    pub fn params(&self) -> ArchetypeParams {
        self.archetype.params()
    }

    pub fn is_specialist_category(&self, category: &str) -> bool {
        self.category_focus.iter().any(|c| c == category)
    }
}

fn focus(categories: &[&str]) -> Vec<String> {
    categories.iter().map(|c| c.to_string()).collect()
}

/// The fixed ten-slot distribution from the original's `AGENT_CONFIG`: two
/// of each archetype, in the order conservative, aggressive, specialist,
/// generalist, opportunist. Specialists focus on data_structures/crypto and
/// math/utilities respectively.
pub fn for_agent_slot(index: usize) -> Personality {
    match index % 10 {
        0 | 1 => Personality {
            archetype: Archetype::Conservative,
            category_focus: Vec::new(),
        },
        2 | 3 => Personality {
            archetype: Archetype::Aggressive,
            category_focus: Vec::new(),
        },
        4 => Personality {
            archetype: Archetype::Specialist,
            category_focus: focus(&["math", "crypto"]),
        },
        5 => Personality {
            archetype: Archetype::Specialist,
            category_focus: focus(&["data_structures", "text"]),
        },
        6 | 7 => Personality {
            archetype: Archetype::Generalist,
            category_focus: Vec::new(),
        },
        8 | 9 => Personality {
            archetype: Archetype::Opportunist,
            category_focus: Vec::new(),
        },
        _ => unreachable!("index % 10 is always in 0..10"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_slots_distribute_two_per_archetype() {
        let mut conservative = 0;
        let mut aggressive = 0;
        let mut specialist = 0;
        let mut generalist = 0;
        let mut opportunist = 0;
        for i in 0..10 {
            match for_agent_slot(i).archetype {
                Archetype::Conservative => conservative += 1,
                Archetype::Aggressive => aggressive += 1,
                Archetype::Specialist => specialist += 1,
                Archetype::Generalist => generalist += 1,
                Archetype::Opportunist => opportunist += 1,
            }
        }
        assert_eq!((conservative, aggressive, specialist, generalist, opportunist), (2, 2, 2, 2, 2));
    }

    #[test]
    fn specialists_carry_a_fixed_focus() {
        let p = for_agent_slot(4);
        assert!(p.is_specialist_category("crypto"));
        assert!(!p.is_specialist_category("text"));
    }
}
