use rand::seq::SliceRandom;
use rand::Rng;

const AVATAR_BASE: &str = "https://api.dicebear.com/7.x/notionists/svg";
const AVATAR_BACKGROUNDS: &str = "b6e3f4,c0aede,d1d4f9,ffd5dc,ffdfbf";

pub const ADJECTIVES: &[&str] = &[
    "Adorable", "Adventurous", "Agile", "Amazing", "Amusing", "Blazing", "Bold", "Brave",
    "Bright", "Brilliant", "Calm", "Careful", "Charming", "Cheerful", "Clever", "Colorful",
    "Courageous", "Creative", "Curious", "Daring", "Delightful", "Determined", "Eager", "Elegant",
    "Energetic", "Enthusiastic", "Fantastic", "Fast", "Fearless", "Feisty", "Fierce", "Friendly",
    "Funny", "Gentle", "Gigantic", "Graceful", "Happy", "Helpful", "Honest", "Humorous",
    "Impressive", "Incredible", "Intelligent", "Interesting", "Jolly", "Joyful", "Kind", "Lively",
    "Lucky", "Magical", "Majestic", "Marvelous", "Mighty", "Mysterious", "Noble", "Optimistic",
    "Peaceful", "Playful", "Powerful", "Proud", "Quick", "Quiet", "Remarkable", "Resilient",
    "Resourceful", "Respectful", "Silly", "Smart", "Speedy", "Spirited", "Splendid", "Stellar",
    "Strong", "Stunning", "Superb", "Swift", "Talented", "Tenacious", "Thankful", "Thoughtful",
    "Thrilling", "Trustworthy", "Valiant", "Versatile", "Vibrant", "Vigilant", "Warm", "Watchful",
    "Wild", "Wise", "Witty", "Wonderful", "Zany", "Zealous",
];

pub const ANIMALS: &[&str] = &[
    "Alligator", "Antelope", "Armadillo", "Badger", "Bat", "Bear", "Beaver", "Bee",
    "Bison", "Butterfly", "Camel", "Cat", "Cheetah", "Chicken", "Chimpanzee", "Chinchilla",
    "Cobra", "Coyote", "Crab", "Crocodile", "Crow", "Deer", "Dolphin", "Dove",
    "Duck", "Eagle", "Elephant", "Elk", "Falcon", "Ferret", "Finch", "Flamingo",
    "Fox", "Frog", "Gazelle", "Giraffe", "Goat", "Goldfish", "Goose", "Gorilla",
    "Hamster", "Hare", "Hawk", "Hedgehog", "Hippopotamus", "Horse", "Hummingbird", "Hyena",
    "Iguana", "Impala", "Jaguar", "Jellyfish", "Kangaroo", "Koala", "Komodo", "Lemur",
    "Leopard", "Lion", "Llama", "Lobster", "Lynx", "Macaw", "Magpie", "Meerkat",
    "Mongoose", "Monkey", "Moose", "Mouse", "Narwhal", "Newt", "Nightingale", "Octopus",
    "Okapi", "Opossum", "Ostrich", "Otter", "Owl", "Oyster", "Panda", "Panther",
    "Parrot", "Peacock", "Pelican", "Penguin", "Pheasant", "Platypus", "Porcupine", "Puma",
    "Quail", "Quokka", "Rabbit", "Raccoon", "Raven", "Reindeer", "Rhinoceros", "Salamander",
    "Salmon", "Scorpion", "Seahorse", "Seal", "Shark", "Sheep", "Sloth", "Snail",
    "Snake", "Sparrow", "Squid", "Squirrel", "Starfish", "Swan", "Tiger", "Toucan",
    "Turkey", "Turtle", "Vulture", "Walrus", "Weasel", "Whale", "Wolf", "Wolverine",
    "Wombat", "Woodpecker", "Yak", "Zebra",
];

/// A name of the form `Adjective-Animal`, offered to users who do not pick one.
pub fn random_profile_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).unwrap_or(&"Happy");
    let animal = ANIMALS.choose(rng).unwrap_or(&"Otter");
    format!("{}-{}", adjective, animal)
}

/// The generated avatar of a profile. The same name always gives the same picture.
pub fn avatar_url(name: &str) -> String {
    let seed: String = url::form_urlencoded::byte_serialize(name.trim().as_bytes()).collect();
    format!(
        "{}?seed={}&backgroundColor={}",
        AVATAR_BASE, seed, AVATAR_BACKGROUNDS
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn names_come_from_the_lists() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let name = random_profile_name(&mut rng);
            let (adjective, animal) = name.split_once('-').unwrap();
            assert!(ADJECTIVES.contains(&adjective));
            assert!(ANIMALS.contains(&animal));
        }
    }

    #[test]
    fn seeded_names_repeat() {
        let a = random_profile_name(&mut StdRng::seed_from_u64(42));
        let b = random_profile_name(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn avatar_seed_is_encoded() {
        assert_eq!(
            avatar_url(" Brave-Otter "),
            "https://api.dicebear.com/7.x/notionists/svg?seed=Brave-Otter&backgroundColor=b6e3f4,c0aede,d1d4f9,ffd5dc,ffdfbf"
        );
        assert!(avatar_url("Tom & Jerry").contains("seed=Tom+%26+Jerry&"));
    }
}
