//! Coarse denylist for prompt injection and off-topic requests.
//!
//! This is pattern matching, not classification. Both false positives and
//! false negatives are expected; the system instructions are the second line.

use regex::RegexSet;
use std::fmt;
use std::sync::LazyLock;

/// Families of requests the assistant refuses outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionCategory {
    CodeGeneration,
    Exploit,
    IgnoreInstructions,
    RoleOverride,
    RevealInstructions,
    SensitiveData,
}

impl InjectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionCategory::CodeGeneration => "code_generation",
            InjectionCategory::Exploit => "exploit",
            InjectionCategory::IgnoreInstructions => "ignore_instructions",
            InjectionCategory::RoleOverride => "role_override",
            InjectionCategory::RevealInstructions => "reveal_instructions",
            InjectionCategory::SensitiveData => "sensitive_data",
        }
    }
}

impl fmt::Display for InjectionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PATTERNS: &[(InjectionCategory, &str)] = &[
    (
        InjectionCategory::CodeGeneration,
        r"(?i)\b(write|generate|create|give\s+me|make)\b.{0,40}\b(code|script|program|function|snippet|sql\s+query)\b",
    ),
    (
        InjectionCategory::CodeGeneration,
        r"(?i)\b(debug|fix|solve)\b.{0,20}\b(my|this)\s+(code|bug|program|homework)\b",
    ),
    (
        InjectionCategory::Exploit,
        r"(?i)\b(hack|hacking|exploit|jailbreak|bypass|malware|ransomware|keylogger|phishing|sql\s*injection|xss|ddos)\b",
    ),
    (
        InjectionCategory::IgnoreInstructions,
        r"(?i)\b(ignore|disregard|forget|override)\b.{0,20}\b(previous|prior|above|earlier|all|your)\b.{0,20}\b(instructions|prompts?|rules|directions|guidelines)\b",
    ),
    (
        InjectionCategory::RoleOverride,
        r"(?i)\b(you\s+are\s+now|act\s+as|pretend\s+(to\s+be|you\s+are)|role\s*-?play\s+as|from\s+now\s+on\s+you|new\s+persona|developer\s+mode|dan\s+mode)\b",
    ),
    (
        InjectionCategory::RevealInstructions,
        r"(?i)\b(reveal|show|print|repeat|display|output|leak|tell\s+me)\b.{0,30}\b(system\s+prompt|instructions|initial\s+prompt|hidden\s+prompt)\b",
    ),
    (
        InjectionCategory::RevealInstructions,
        r"(?i)\bwhat\s+(is|are)\s+your\s+(system\s+prompt|instructions|rules)\b",
    ),
    (
        InjectionCategory::SensitiveData,
        r"(?i)\b(home\s+address|phone\s+number|social\s+security|ssn|passwords?|bank\s+account|credit\s+card|date\s+of\s+birth)\b",
    ),
];

static DENYLIST: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new(PATTERNS.iter().map(|(_, p)| *p)).unwrap());

/// Whether `text` matches any denylisted pattern.
pub fn is_injection_attempt(text: &str) -> bool {
    DENYLIST.is_match(text)
}

/// Every category that fired for `text`, without duplicates, in declaration order.
pub fn matched_categories(text: &str) -> Vec<InjectionCategory> {
    let mut categories: Vec<InjectionCategory> = Vec::new();
    for idx in DENYLIST.matches(text).iter() {
        let category = PATTERNS[idx].0;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    categories
}
