//! The `markwise init` command.

use std::path::Path;

use anyhow::Result;

fn write_if_missing(path: &str, content: &str) -> Result<()> {
    if Path::new(path).exists() {
        println!("{path} already exists, skipping.");
    } else {
        std::fs::write(path, content)?;
        println!("Created {path}");
    }
    Ok(())
}

pub fn execute() -> Result<()> {
    write_if_missing("markwise.toml", SAMPLE_CONFIG)?;
    std::fs::create_dir_all("papers")?;
    write_if_missing("papers/example.toml", EXAMPLE_PAPER)?;
    write_if_missing("papers/example-submissions.toml", EXAMPLE_SUBMISSIONS)?;

    println!("\nNext steps:");
    println!("  1. Edit markwise.toml (set [llm] enabled = true and an API key for hybrid scoring)");
    println!("  2. Run: markwise validate --paper papers/example.toml");
    println!("  3. Run: markwise grade --paper papers/example.toml --submissions papers/example-submissions.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# markwise configuration

[engine]
hybrid_weight = 0.6
parallelism = 4
low_confidence_threshold = 0.5

[sandbox]
timeout_secs = 5
python = "python3"
memory_limit_mb = 256
network_namespace = true

[llm]
enabled = false
provider = "gemini"
request_timeout_secs = 30
requests_per_minute = 15

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

# Override a subject profile (weights must sum to 1.0):
# [profiles.science]
# semantic = 0.25
# keyword = 0.35
# structure = 0.10
# comprehensiveness = 0.30
"#;

const EXAMPLE_PAPER: &str = r#"[paper]
id = "example"
name = "Example Paper"
default_subject = "science"

[[questions]]
id = "q1"
text = "Explain the process of photosynthesis."
model_answer = """
Photosynthesis is the process by which green plants use sunlight, water and carbon dioxide to make glucose and release oxygen. \
Chlorophyll in the chloroplasts absorbs light energy, which drives the light-dependent reactions producing ATP and NADPH. \
The Calvin cycle then uses them to fix carbon dioxide into sugar.
"""
max_marks = 10
main_question_number = 1

[[questions]]
id = "q2a"
text = "State Newton's first law of motion."
model_answer = "An object remains at rest or in uniform motion in a straight line unless acted upon by a net external force."
max_marks = 5
subject_area = "physics"
main_question_number = 2
sub_question = "a"
or_group = "q2"

[[questions]]
id = "q2b"
text = "State Newton's second law of motion."
model_answer = "The net force on an object equals its mass multiplied by its acceleration, F = ma."
max_marks = 5
subject_area = "physics"
main_question_number = 2
sub_question = "b"
or_group = "q2"

[[questions]]
id = "q3"
text = "Write a Python function sum_even(numbers) returning the sum of the even numbers in a list. Example: sum_even([1, 2, 3, 4, 5, 6]) == 12"
model_answer = """
# test: [1, 2, 3, 4, 5, 6] -> 12
# test: [] -> 0
# test: [7, 9] -> 0
def sum_even(numbers):
    total = 0
    for n in numbers:
        if n % 2 == 0:
            total += n
    return total
"""
max_marks = 10
type = "coding"
subject_area = "programming"
main_question_number = 3
"#;

const EXAMPLE_SUBMISSIONS: &str = r#"[[submissions]]
student_name = "Asha"

[[submissions.answers]]
question_id = "q1"
text = "Plants use sunlight, water and carbon dioxide to make glucose and oxygen. Chlorophyll absorbs the light."

[[submissions.answers]]
question_id = "q2a"
text = "An object stays at rest or keeps moving at constant velocity unless a net force acts on it."

[[submissions.answers]]
question_id = "q3"
text = """
def sum_even(numbers):
    return sum(n for n in numbers if n % 2 == 0)
"""

[[submissions]]
student_name = "Ben"

[[submissions.answers]]
question_id = "q1"
text = "Plants make food from light."
ocr_confidence = 0.4

[[submissions.answers]]
question_id = "q2b"
text = "Force equals mass times acceleration."

[[submissions.answers]]
question_id = "q3"
text = """
def sum_even(numbers):
    return sum(numbers)
"""

# A whole OCR'd answer sheet, split on the student's own question markers.
[[submissions]]
student_name = "Cai"
sheet = """
2 (b) Force equals mass multiplied by acceleration, F = ma.
1. Green plants absorb sunlight with chlorophyll and turn carbon dioxide
and water into glucose, releasing oxygen.
"""
"#;
