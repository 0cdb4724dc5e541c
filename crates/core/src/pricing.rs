//! Per-model token pricing and cost computation.
//!
//! All money math uses `Decimal`; token counts convert through exact decimal
//! division by one million, never floats.

use rust_decimal::Decimal;

use crate::domain::model::Model;
use crate::domain::usage::TokenUsage;

const TOKENS_PER_PRICE_UNIT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// USD per million tokens, split by the four billing categories.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPrice {
    pub input: Decimal,
    pub output: Decimal,
    pub cache_write: Decimal,
    pub cache_read: Decimal,
}

/// Price table for a model tier. A match over `Model` keeps unknown models
/// unrepresentable; config parsing rejects unknown ids long before this.
pub fn price_of(model: Model) -> ModelPrice {
    match model {
        Model::Haiku35 => ModelPrice {
            input: Decimal::new(80, 2),         // 0.80
            output: Decimal::new(400, 2),       // 4.00
            cache_write: Decimal::new(100, 2),  // 1.00
            cache_read: Decimal::new(8, 2),     // 0.08
        },
        Model::Sonnet4 => ModelPrice {
            input: Decimal::new(300, 2),        // 3.00
            output: Decimal::new(1500, 2),      // 15.00
            cache_write: Decimal::new(375, 2),  // 3.75
            cache_read: Decimal::new(30, 2),    // 0.30
        },
        Model::Opus4 => ModelPrice {
            input: Decimal::new(1500, 2),       // 15.00
            output: Decimal::new(7500, 2),      // 75.00
            cache_write: Decimal::new(1875, 2), // 18.75
            cache_read: Decimal::new(150, 2),   // 1.50
        },
    }
}

/// Cost of one round-trip (or an aggregate of several): the sum of four
/// independent linear terms, `tokens * price / 1_000_000`.
pub fn cost_of(model: Model, usage: &TokenUsage) -> Decimal {
    let price = price_of(model);
    term(usage.input, price.input)
        + term(usage.output, price.output)
        + term(usage.cache_write, price.cache_write)
        + term(usage.cache_read, price.cache_read)
}

fn term(tokens: u64, per_million: Decimal) -> Decimal {
    Decimal::from(tokens) * per_million / TOKENS_PER_PRICE_UNIT
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{cost_of, price_of};
    use crate::domain::model::Model;
    use crate::domain::usage::TokenUsage;

    #[test]
    fn cost_is_the_sum_of_four_linear_terms() {
        let usage = TokenUsage::new(1_000_000, 1_000_000, 1_000_000, 1_000_000);
        let price = price_of(Model::Sonnet4);
        let expected = price.input + price.output + price.cache_write + price.cache_read;
        assert_eq!(cost_of(Model::Sonnet4, &usage), expected);
    }

    #[test]
    fn doubling_one_category_doubles_only_its_own_term() {
        let base = TokenUsage::new(10_000, 2_000, 0, 0);
        let doubled_output = TokenUsage::new(10_000, 4_000, 0, 0);

        let base_cost = cost_of(Model::Opus4, &base);
        let output_term = cost_of(Model::Opus4, &TokenUsage::new(0, 2_000, 0, 0));
        assert_eq!(cost_of(Model::Opus4, &doubled_output), base_cost + output_term);
    }

    #[test]
    fn zero_usage_costs_nothing() {
        assert_eq!(cost_of(Model::Haiku35, &TokenUsage::default()), Decimal::ZERO);
    }

    #[test]
    fn cache_reads_are_cheaper_than_fresh_input_on_every_tier() {
        for model in [Model::Haiku35, Model::Sonnet4, Model::Opus4] {
            let price = price_of(model);
            assert!(price.cache_read < price.input, "{model} cache reads must discount input");
            assert!(price.cache_write > price.input, "{model} cache writes carry a premium");
        }
    }

    #[test]
    fn known_point_value_for_haiku() {
        // 500k input at $0.80/M + 100k output at $4.00/M = 0.40 + 0.40
        let usage = TokenUsage::new(500_000, 100_000, 0, 0);
        assert_eq!(cost_of(Model::Haiku35, &usage), Decimal::new(80, 2));
    }
}
