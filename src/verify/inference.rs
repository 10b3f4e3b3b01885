//! Maps language and topic signals to the skill vocabulary.

use std::collections::BTreeSet;

use super::evidence::EvidenceSnapshot;

/// Primary language → associated skill labels.
const LANGUAGE_SKILLS: &[(&str, &[&str])] = &[
    ("Python", &["Python", "Django", "Flask", "Machine Learning", "Data Science"]),
    ("JavaScript", &["JavaScript", "Node.js", "Express", "Web Development"]),
    ("TypeScript", &["TypeScript", "JavaScript", "Node.js", "Angular"]),
    ("Java", &["Java", "Spring", "Android"]),
    ("Kotlin", &["Kotlin", "Android", "Mobile Development"]),
    ("Swift", &["Swift", "iOS", "Mobile Development"]),
    ("Objective-C", &["Objective-C", "iOS"]),
    ("Dart", &["Dart", "Flutter", "Mobile Development"]),
    ("C", &["C", "Embedded Systems"]),
    ("C++", &["C++", "Game Development", "Embedded Systems"]),
    ("C#", &["C#", ".NET", "Unity", "Game Development"]),
    ("Go", &["Go", "Backend Development", "Microservices"]),
    ("Rust", &["Rust", "Systems Programming", "WebAssembly"]),
    ("Ruby", &["Ruby", "Ruby on Rails"]),
    ("PHP", &["PHP", "Laravel", "WordPress"]),
    ("Scala", &["Scala", "Spark", "Big Data"]),
    ("R", &["R", "Data Science", "Statistics"]),
    ("Julia", &["Julia", "Scientific Computing"]),
    ("MATLAB", &["MATLAB", "Signal Processing"]),
    ("Jupyter Notebook", &["Python", "Data Science", "Machine Learning"]),
    ("HTML", &["HTML", "Web Development"]),
    ("CSS", &["CSS", "Web Development", "UI Design"]),
    ("SCSS", &["CSS", "Sass", "Web Development"]),
    ("Vue", &["Vue.js", "JavaScript", "Frontend Development"]),
    ("Svelte", &["Svelte", "JavaScript", "Frontend Development"]),
    ("Shell", &["Bash", "Linux", "DevOps"]),
    ("Dockerfile", &["Docker", "DevOps"]),
    ("HCL", &["Terraform", "DevOps", "Cloud Computing"]),
    ("Solidity", &["Solidity", "Blockchain", "Smart Contracts"]),
    ("Haskell", &["Haskell", "Functional Programming"]),
    ("Elixir", &["Elixir", "Phoenix", "Functional Programming"]),
    ("Lua", &["Lua", "Game Development"]),
];

/// Repository topic tag (lowercase) → associated skill labels.
const TOPIC_SKILLS: &[(&str, &[&str])] = &[
    ("react", &["React", "Frontend Development"]),
    ("reactjs", &["React", "Frontend Development"]),
    ("react-native", &["React Native", "Mobile Development"]),
    ("nextjs", &["Next.js", "React", "Frontend Development"]),
    ("vue", &["Vue.js", "Frontend Development"]),
    ("angular", &["Angular", "Frontend Development"]),
    ("svelte", &["Svelte", "Frontend Development"]),
    ("tailwindcss", &["Tailwind CSS", "UI Design"]),
    ("nodejs", &["Node.js", "Backend Development"]),
    ("express", &["Express", "Node.js", "Backend Development"]),
    ("django", &["Django", "Python", "Backend Development"]),
    ("flask", &["Flask", "Python", "Backend Development"]),
    ("fastapi", &["FastAPI", "Python", "Backend Development"]),
    ("spring-boot", &["Spring", "Java", "Backend Development"]),
    ("rails", &["Ruby on Rails", "Backend Development"]),
    ("laravel", &["Laravel", "PHP", "Backend Development"]),
    ("graphql", &["GraphQL", "API Design"]),
    ("rest-api", &["REST APIs", "API Design"]),
    ("flutter", &["Flutter", "Mobile Development"]),
    ("android", &["Android", "Mobile Development"]),
    ("ios", &["iOS", "Mobile Development"]),
    ("machine-learning", &["Machine Learning", "AI"]),
    ("deep-learning", &["Deep Learning", "Machine Learning", "AI"]),
    ("artificial-intelligence", &["AI", "Machine Learning"]),
    ("tensorflow", &["TensorFlow", "Machine Learning"]),
    ("pytorch", &["PyTorch", "Deep Learning"]),
    ("nlp", &["NLP", "Machine Learning"]),
    ("computer-vision", &["Computer Vision", "Machine Learning"]),
    ("data-science", &["Data Science", "Data Analysis"]),
    ("pandas", &["Pandas", "Data Analysis"]),
    ("docker", &["Docker", "DevOps"]),
    ("kubernetes", &["Kubernetes", "DevOps", "Cloud Computing"]),
    ("aws", &["AWS", "Cloud Computing"]),
    ("gcp", &["Google Cloud", "Cloud Computing"]),
    ("azure", &["Azure", "Cloud Computing"]),
    ("terraform", &["Terraform", "DevOps"]),
    ("ci-cd", &["CI/CD", "DevOps"]),
    ("firebase", &["Firebase", "Backend Development"]),
    ("mongodb", &["MongoDB", "Databases"]),
    ("postgresql", &["PostgreSQL", "SQL", "Databases"]),
    ("mysql", &["MySQL", "SQL", "Databases"]),
    ("redis", &["Redis", "Databases"]),
    ("blockchain", &["Blockchain", "Web3"]),
    ("ethereum", &["Ethereum", "Blockchain", "Web3"]),
    ("web3", &["Web3", "Blockchain"]),
    ("game-development", &["Game Development"]),
    ("unity", &["Unity", "Game Development"]),
    ("figma", &["Figma", "UI Design"]),
    ("cybersecurity", &["Cybersecurity", "Security"]),
    ("iot", &["IoT", "Embedded Systems"]),
];

/// Skills implied by a single language, if it is recognized.
pub fn skills_for_language(language: &str) -> Option<&'static [&'static str]> {
    let language = language.trim();
    LANGUAGE_SKILLS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(language))
        .map(|(_, skills)| *skills)
}

/// Skills implied by a single topic tag, if it is recognized.
pub fn skills_for_topic(topic: &str) -> Option<&'static [&'static str]> {
    let topic = topic.trim().to_lowercase();
    TOPIC_SKILLS
        .iter()
        .find(|(key, _)| *key == topic)
        .map(|(_, skills)| *skills)
}

/// Union of the skills implied by every recognized language and topic.
/// Unrecognized entries are ignored.
pub fn infer_skills<'a, L, T>(languages: L, topics: T) -> BTreeSet<String>
where
    L: IntoIterator<Item = &'a str>,
    T: IntoIterator<Item = &'a str>,
{
    let from_languages = languages.into_iter().filter_map(skills_for_language);
    let from_topics = topics.into_iter().filter_map(skills_for_topic);

    from_languages
        .chain(from_topics)
        .flat_map(|skills| skills.iter())
        .map(|skill| (*skill).to_string())
        .collect()
}

pub fn infer_from_snapshot(snapshot: &EvidenceSnapshot) -> BTreeSet<String> {
    infer_skills(
        snapshot.languages.iter().map(String::as_str),
        snapshot.topics.iter().map(String::as_str),
    )
}

/// Canonical matching form: lowercased, parenthetical qualifiers removed,
/// whitespace collapsed. `"React (Hooks)"` becomes `"react"`.
pub fn normalize_skill(skill: &str) -> String {
    let mut depth = 0usize;
    let mut stripped = String::with_capacity(skill.len());
    for ch in skill.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(ch),
            _ => {}
        }
    }
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Declared skills supported by the inferred set, in their declared spelling.
pub fn match_skills<S: AsRef<str>>(
    declared: &[S],
    inferred: &BTreeSet<String>,
) -> BTreeSet<String> {
    let inferred_normalized: BTreeSet<String> =
        inferred.iter().map(|s| normalize_skill(s)).collect();

    declared
        .iter()
        .map(AsRef::as_ref)
        .filter(|skill| {
            let normalized = normalize_skill(skill);
            !normalized.is_empty() && inferred_normalized.contains(&normalized)
        })
        .map(|skill| skill.trim().to_string())
        .collect()
}
