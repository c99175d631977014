//! Prompt templates bundled at compile time, plus the fixed templates that
//! turn upstream stage output into the next stage's input.

/// Triage - answers simple queries directly, flags the rest as complex
pub const TRIAGE: &str = include_str!("defaults/triage.md");

/// Interpreter - breaks the query into objectives
pub const INTERPRETER: &str = include_str!("defaults/interpreter.md");

/// Researcher - identifies what needs investigating
pub const RESEARCHER: &str = include_str!("defaults/researcher.md");

/// Critic - looks for gaps and bias
pub const CRITIC: &str = include_str!("defaults/critic.md");

/// Creative - alternative perspectives
pub const CREATIVE: &str = include_str!("defaults/creative.md");

/// Synthesizer - merges everything into the final answer
pub const SYNTHESIZER: &str = include_str!("defaults/synthesizer.md");

/// `"\nPrevious conversation:\n..."` or empty when there is no history
pub fn conversation_context(history: &str) -> String {
    if history.is_empty() {
        String::new()
    } else {
        format!("\nPrevious conversation:\n{}", history)
    }
}

pub fn triage_input(query: &str, context_info: &str) -> String {
    format!("Evaluate this query: '{}'{}", query, context_info)
}

pub fn interpreter_input(query: &str, context_info: &str) -> String {
    format!(
        "Analyze this query considering the conversation context:\n{}\nQuery: '{}'",
        context_info, query
    )
}

pub fn researcher_input(interpretation: &str) -> String {
    format!(
        "Based on this interpretation:\n{}\nWhat specific aspects need investigation?",
        interpretation
    )
}

pub fn critic_input(research: &str) -> String {
    format!("Critically analyze these research points:\n{}", research)
}

pub fn creative_input(analysis: &str) -> String {
    format!(
        "Given this analysis:\n{}\nExplore creative perspectives and alternatives.",
        analysis
    )
}

/// Everything the synthesizer sees, under labeled headings
pub fn synthesis_input(
    query: &str,
    interpretation: &str,
    research: &str,
    analysis: &str,
    perspectives: &str,
) -> String {
    format!(
        "Original Query: {}\n\n\
         Interpretation: {}\n\n\
         Research Points: {}\n\n\
         Critical Analysis: {}\n\n\
         Creative Perspectives: {}\n\n\
         Please synthesize all this information into a comprehensive response.",
        query, interpretation, research, analysis, perspectives
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_prompts_non_empty() {
        let prompts = [TRIAGE, INTERPRETER, RESEARCHER, CRITIC, CREATIVE, SYNTHESIZER];
        for (i, content) in prompts.iter().enumerate() {
            assert!(content.trim().len() > 50, "Prompt #{} seems too short", i);
        }
    }

    #[test]
    fn test_triage_prompt_documents_marker() {
        assert!(TRIAGE.contains("SIMPLE:"));
        assert!(TRIAGE.contains("COMPLEX"));
    }

    #[test]
    fn test_conversation_context_empty_without_history() {
        assert_eq!(conversation_context(""), "");
        assert_eq!(
            conversation_context("User: hi\nAssistant: hello\n"),
            "\nPrevious conversation:\nUser: hi\nAssistant: hello\n"
        );
    }

    #[test]
    fn test_synthesis_input_has_every_heading() {
        let input = synthesis_input("q", "i", "r", "c", "p");
        for heading in [
            "Original Query: q",
            "Interpretation: i",
            "Research Points: r",
            "Critical Analysis: c",
            "Creative Perspectives: p",
        ] {
            assert!(input.contains(heading), "missing '{}'", heading);
        }
    }
}
