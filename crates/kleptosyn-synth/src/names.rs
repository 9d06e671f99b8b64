//! Synthetic display names.
//!
//! One RNG draw per name, decoded into word indices.

use kleptosyn_motif::EntityKind;
use rand::Rng;

const GIVEN: [&str; 24] = [
    "Alexei", "Anna", "Boris", "Daria", "David", "Elena", "Emma", "Farid", "Georgios", "Helen",
    "Igor", "James", "Katarina", "Leyla", "Marco", "Maria", "Nikolai", "Olga", "Pavel", "Sarah",
    "Sergei", "Sofia", "Thomas", "Yulia",
];

const FAMILY: [&str; 24] = [
    "Abbott", "Aliyev", "Baker", "Christou", "Dimitriou", "Fischer", "Georgiou", "Hughes",
    "Ivanov", "Kalnins", "Kowalski", "Mansour", "Morozov", "Novak", "Ozols", "Papadopoulos",
    "Petrov", "Rahman", "Rossi", "Smirnov", "Sokolova", "Taylor", "Volkov", "Walsh",
];

const ORG_STEM: [&str; 20] = [
    "Amber", "Atlas", "Baltic", "Caspian", "Cedar", "Coral", "Delta", "Falcon", "Granite",
    "Harbor", "Horizon", "Meridian", "Northgate", "Orion", "Pinnacle", "Sapphire", "Silverline",
    "Summit", "Vantage", "Westbridge",
];

const ORG_TRADE: [&str; 10] = [
    "Capital", "Consulting", "Holdings", "Investments", "Logistics", "Management", "Resources",
    "Shipping", "Trading", "Ventures",
];

const ORG_SUFFIX: [&str; 6] = ["Ltd", "LLC", "LLP", "Inc", "SA", "Corp"];

pub fn draw_name<R: Rng + ?Sized>(kind: EntityKind, rng: &mut R) -> String {
    match kind {
        EntityKind::Person => {
            let n = rng.gen_range(0..GIVEN.len() * FAMILY.len());
            format!("{} {}", GIVEN[n % GIVEN.len()], FAMILY[n / GIVEN.len()])
        }
        EntityKind::Organization => {
            let n = rng.gen_range(0..ORG_STEM.len() * ORG_TRADE.len() * ORG_SUFFIX.len());
            let stem = ORG_STEM[n % ORG_STEM.len()];
            let rest = n / ORG_STEM.len();
            let trade = ORG_TRADE[rest % ORG_TRADE.len()];
            let suffix = ORG_SUFFIX[rest / ORG_TRADE.len()];
            format!("{stem} {trade} {suffix}")
        }
    }
}
