//! Human-friendly workspace names of the form `adverb-adjective-noun`.
//!
//! Names are not checked for uniqueness against the cluster; a collision
//! surfaces as a create failure.

use rand::seq::SliceRandom;
use rand::Rng;

const ADVERBS: &[&str] = &[
    "boldly", "briskly", "calmly", "cheerfully", "closely", "deeply", "eagerly", "evenly",
    "fairly", "firmly", "freely", "gently", "gladly", "greatly", "happily", "honestly",
    "keenly", "kindly", "lightly", "loudly", "merrily", "neatly", "nicely", "openly",
    "partly", "politely", "quickly", "quietly", "rapidly", "rarely", "really", "safely",
    "sharply", "simply", "slowly", "smoothly", "softly", "solely", "steadily", "surely",
    "swiftly", "tightly", "truly", "vastly", "warmly", "wildly", "wisely", "yearly",
];

const ADJECTIVES: &[&str] = &[
    "amber", "ample", "azure", "bold", "brave", "bright", "calm", "clever", "cosmic",
    "crisp", "curious", "daring", "eager", "fancy", "fluent", "fresh", "frosty", "gentle",
    "golden", "grand", "happy", "hidden", "honest", "humble", "jolly", "keen", "lively",
    "lucky", "mellow", "mighty", "modest", "noble", "patient", "plucky", "polished",
    "proud", "quiet", "rapid", "robust", "rustic", "sharp", "shiny", "silent", "sleek",
    "smooth", "snowy", "solid", "steady", "sunny", "swift", "tidy", "vivid", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "beacon", "birch", "canyon", "cedar", "comet", "condor", "coral", "crane",
    "delta", "dolphin", "ember", "falcon", "fern", "fjord", "forest", "garnet", "glacier",
    "harbor", "hawk", "heron", "island", "jaguar", "lagoon", "lantern", "lynx", "maple",
    "meadow", "meteor", "otter", "panda", "pebble", "pine", "quartz", "raven", "reef",
    "river", "robin", "sparrow", "summit", "thistle", "tiger", "tundra", "valley", "walrus",
    "willow", "wombat", "zephyr",
];

pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adverb = pick(rng, ADVERBS);
    let adjective = pick(rng, ADJECTIVES);
    let noun = pick(rng, NOUNS);
    format!("{}-{}-{}", adverb, adjective, noun)
}

fn pick<R: Rng + ?Sized>(rng: &mut R, words: &[&'static str]) -> &'static str {
    words.choose(rng).copied().unwrap_or("workspace")
}
