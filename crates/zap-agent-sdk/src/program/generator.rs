//! Program generation (opaque producer): picks a category, a template
//! variant, and a complexity tier, then renders the skeleton into source
//! text and prices the result.

use rand::seq::SliceRandom;
use rand::Rng;

use super::templates::{base_price, templates_for, CATEGORIES};
use super::{new_program_id, Complexity, Program};

pub struct ProgramGenerator {
    pub price_multiplier: f64,
}

impl ProgramGenerator {
    pub fn new(price_multiplier: f64) -> Self {
        Self { price_multiplier }
    }

    /// `category`: explicit request; `specialist_focus`: the personality's
    /// focus list, preferred 70% of the time when no explicit category is
    /// given; otherwise falls back to a uniform random category.
    pub fn generate(
        &self,
        category: Option<&str>,
        specialist_focus: &[String],
    ) -> (Program, String) {
        let mut rng = rand::thread_rng();

        let category = category.map(|c| c.to_string()).unwrap_or_else(|| {
            if !specialist_focus.is_empty() && rng.gen_bool(0.7) {
                specialist_focus
                    .choose(&mut rng)
                    .cloned()
                    .unwrap_or_else(|| CATEGORIES[0].to_string())
            } else {
                CATEGORIES.choose(&mut rng).unwrap().to_string()
            }
        });

        let complexity = *[Complexity::Simple, Complexity::Medium, Complexity::Complex]
            .choose(&mut rng)
            .unwrap();

        let templates = templates_for(&category);
        let template = templates.choose(&mut rng).unwrap();
        let variant = template.variants.choose(&mut rng).unwrap();

        let source = template
            .skeleton
            .replace("{variant}", variant)
            .replace("{description}", &format!("auto-generated {category} helper"))
            .replace("{body}", "return n")
            .replace("{limit}", "10");

        let name = template.name_pattern.replace("{variant}", variant);

        let price = ((base_price(&category) as f64) * self.price_multiplier * complexity.factor())
            .round()
            .max(10.0) as u64;
        // Production cost is not given as a closed formula in the source;
        // half the listing price, floored at 10, is the adopted reading.
        let production_cost = (price / 2).max(10);

        let quality = rng.gen_range(0.7..=1.0);

        let program = Program {
            id: new_program_id(),
            name,
            category,
            complexity,
            price,
            production_cost,
            quality,
            listed: false,
            listed_at: None,
            listing_event_id: None,
        };

        (program, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_program_starts_above_the_discard_threshold() {
        let gen = ProgramGenerator::new(1.0);
        let (program, source) = gen.generate(Some("math"), &[]);
        assert!(program.quality >= 0.7);
        assert!(!program.should_discard());
        assert!(!source.is_empty());
        assert!(program.price >= 10);
        assert!(program.production_cost >= 10);
    }

    #[test]
    fn respects_an_explicit_category() {
        let gen = ProgramGenerator::new(1.0);
        let (program, _) = gen.generate(Some("crypto"), &[]);
        assert_eq!(program.category, "crypto");
    }
}
