//! Prompt assembly for summarization, design, and modification requests
//!
//! The JSON response contract is appended to every design prompt regardless
//! of prompt mode so the normalizer always has a shape to work against.

use crate::config::PromptMode;
use crate::types::{CardDesign, Dimensions};

/// Inputs shared by every design prompt
#[derive(Debug, Clone, Copy)]
pub struct DesignPromptParams<'a> {
    pub title: &'a str,
    pub summary: &'a str,
    pub dimensions: Dimensions,
    /// 1-based index of the design being requested
    pub design_number: usize,
    pub number_of_designs: usize,
    /// One request producing all designs, vs. one request per design
    pub batch_mode: bool,
}

/// The JSON contract and escaping rules appended to every design prompt
fn technical_requirements(dimensions: Dimensions, analysis_hint: &str) -> String {
    format!(
        r#"Return ONLY valid JSON in this exact format:
{{
  "analysis": "{analysis_hint}",
  "designs": [
    {{
      "title": "Design concept name",
      "html": "Complete HTML with inline CSS for the card"
    }}
  ]
}}

CRITICAL JSON FORMATTING:
- The HTML string MUST be properly escaped for JSON
- Escape all backslashes: \ becomes \\
- Escape all double quotes: " becomes \"
- Escape all newlines: actual newlines become \n
- Escape all tabs: actual tabs become \t
- Do NOT use backticks (`) in the HTML - they break JSON parsing
- Use regular quotes for HTML attributes

The HTML should be self-contained with all CSS inline or in <style> tags. Use the exact dimensions provided ({dimensions}px). Ensure the HTML is valid and displays properly when rendered."#,
    )
}

/// The design requirements block shared by generation and modification prompts
fn requirements_block(dimensions: Dimensions, batch_mode: bool, number_of_designs: usize) -> String {
    let color_line = if batch_mode {
        "Each design should have a distinct color scheme".to_string()
    } else {
        "Use a distinct color scheme".to_string()
    };
    let composition_line = if batch_mode {
        format!(
            "Create visual variety across all {number_of_designs} designs (different layouts, not just color swaps)"
        )
    } else {
        "Create a unique layout (try different approaches like split screen, centered, asymmetric, etc.)"
            .to_string()
    };
    let similar_line = if batch_mode {
        "\n- Making all designs look too similar"
    } else {
        ""
    };
    format!(
        r#"CONTENT & HIERARCHY:
- Use the title and summary to craft the most compelling message - what would make someone stop scrolling?
- Use MAXIMUM 10 words total (preferably 5-7) - be ruthlessly concise
- Put the most important message first and largest
- Be specific, not generic (e.g., "5 Python Mistakes" not "Python Tips")
- Use size and weight to establish hierarchy: larger/bolder = more important

TYPOGRAPHY (CRITICAL):
- Minimum 60-80px font size for headlines on 1200x630px canvas (scale proportionally for other sizes)
- Use bold/heavy font weights - avoid thin fonts that disappear at thumbnail size
- Limit to 2-3 font weights maximum
- High contrast text: minimum 4.5:1 ratio for body text, 3:1 for large text (WCAG AA)
- Use system fonts or Google Fonts only

COLOR & CONTRAST:
- Design will be viewed at thumbnail size on mobile - high contrast is essential
- Avoid low-contrast "aesthetic" choices that fail accessibility
- Be careful with gradients - they can look muddy when compressed
- {color_line}

COMPOSITION:
- Leave generous breathing room - don't cram elements
- Keep critical elements at least 50px from edges (safe zones for platform cropping)
- Balance text and visual elements - neither should overwhelm
- {composition_line}

TECHNICAL:
- Use exact dimensions: {dimensions}px
- Self-contained HTML with all CSS inline or in <style> tags
- Ensure designs look good when compressed (avoid fine details that blur)

AVOID:
- More than 10 words of text
- Thin/light fonts
- Low contrast text
- Placing text near edges
- Generic stock imagery
- Using background-clip: text or -webkit-background-clip: text (not supported in PNG export - use solid colors instead){similar_line}"#,
    )
}

fn default_prompt_content(params: &DesignPromptParams<'_>) -> String {
    let DesignPromptParams {
        title,
        summary,
        dimensions,
        design_number,
        number_of_designs,
        batch_mode,
    } = *params;

    let design_instruction = if batch_mode {
        format!(
            "You are a social media card designer. Create EXACTLY {number_of_designs} design variations for a social media card based on this blog post."
        )
    } else {
        format!(
            "You are a social media card designer. Create a single unique design variation (design #{design_number} of {number_of_designs}) for a social media card based on this blog post."
        )
    };

    let uniqueness_instruction = if batch_mode {
        format!(
            "IMPORTANT: You MUST create EXACTLY {number_of_designs} different designs. Do not create more or fewer."
        )
    } else {
        "IMPORTANT: Create ONE unique design. Make it distinctly different from typical social media cards. Be creative with the layout, color scheme, and visual approach."
            .to_string()
    };

    format!(
        "{design_instruction}\n\n\
         Blog post title: {title}\n\n\
         Blog post summary: {summary}\n\n\
         Card dimensions: {dimensions}px\n\n\
         {uniqueness_instruction}\n\n\
         Requirements:\n\n{requirements}",
        requirements = requirements_block(dimensions, batch_mode, number_of_designs),
    )
}

/// Substitute `{{variable}}` placeholders in custom instruction text
fn substitute_variables(text: &str, params: &DesignPromptParams<'_>) -> String {
    let substitutions = [
        ("{{title}}", params.title.to_string()),
        ("{{summary}}", params.summary.to_string()),
        ("{{width}}", params.dimensions.width.to_string()),
        ("{{height}}", params.dimensions.height.to_string()),
        ("{{designNumber}}", params.design_number.to_string()),
        ("{{numberOfDesigns}}", params.number_of_designs.to_string()),
    ];
    let mut result = text.to_string();
    for (variable, value) in substitutions {
        result = result.replace(variable, &value);
    }
    result
}

/// Build the full design prompt for one request
///
/// A chat message supplied with the request forces append mode for that
/// invocation, overriding the configured prompt mode.
pub fn build_design_prompt(
    params: &DesignPromptParams<'_>,
    configured_mode: PromptMode,
    custom_instructions: &str,
    chat_message: Option<&str>,
) -> String {
    let (mode, instructions) = match chat_message {
        Some(message) => (PromptMode::Append, message),
        None => (configured_mode, custom_instructions),
    };
    let technical = technical_requirements(
        params.dimensions,
        "Brief analysis of your design approach for this variation",
    );

    match mode {
        PromptMode::Append if !instructions.trim().is_empty() => {
            let processed = substitute_variables(instructions, params);
            format!(
                "{default}\n\nADDITIONAL INSTRUCTIONS:\n{processed}\n\n{technical}",
                default = default_prompt_content(params),
            )
        }
        PromptMode::Custom if !instructions.trim().is_empty() => {
            let processed = substitute_variables(instructions, params);
            format!("{processed}\n\n{technical}")
        }
        // Default mode, or a selected mode with no instruction text to use
        _ => format!(
            "{default}\n\n{technical}",
            default = default_prompt_content(params),
        ),
    }
}

/// Build the summarization prompt for raw blog post text
pub fn build_summarization_prompt(blog_content: &str) -> String {
    format!(
        r#"Analyze this blog post and extract:
1. A clear, compelling title (5-10 words max)
2. A concise summary that captures the main points (2-3 sentences)

Blog post content:
{blog_content}

Return ONLY valid JSON in this exact format:
{{
  "title": "The extracted or refined title",
  "summary": "A 2-3 sentence summary of the key points"
}}"#,
    )
}

/// Build the modification prompt embedding the complete current design set
pub fn build_modification_prompt(
    designs: &[CardDesign],
    dimensions: Dimensions,
    modification_request: &str,
) -> String {
    let designs_context = designs
        .iter()
        .enumerate()
        .map(|(index, design)| {
            format!(
                "Design {number}: {title}\nHTML:\n{html}",
                number = index + 1,
                title = design.title,
                html = design.html,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        r#"You are a social media card designer. The user has requested modifications to existing designs.

Current designs:
{designs_context}

Card dimensions: {dimensions}px

User's modification request:
{modification_request}

IMPORTANT:
1. Parse the user's request carefully to understand which design(s) they want to modify and what changes they want
2. If they mention a specific design number (e.g., "design 3" or "the third one"), modify ONLY that design
3. If they say "all designs" or don't specify, apply the changes to ALL designs
4. Keep all other design properties intact unless specifically asked to change them
5. Return the COMPLETE set of designs (modified ones in their new form, unchanged ones as-is)

Requirements for modified designs:

{requirements}

{technical}"#,
        requirements = requirements_block(dimensions, true, designs.len()),
        technical = technical_requirements(
            dimensions,
            "Brief explanation of what changes you made and to which design(s)",
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(dims: Dimensions) -> DesignPromptParams<'static> {
        DesignPromptParams {
            title: "Rust Error Handling",
            summary: "A tour of Result and the question mark operator.",
            dimensions: dims,
            design_number: 2,
            number_of_designs: 5,
            batch_mode: false,
        }
    }

    fn dims() -> Dimensions {
        Dimensions::new(1200, 630).unwrap()
    }

    #[test]
    fn test_default_mode_includes_contract_and_dimensions() {
        let prompt = build_design_prompt(&params(dims()), PromptMode::Default, "", None);
        assert!(prompt.contains("design #2 of 5"));
        assert!(prompt.contains("1200x630px"));
        assert!(prompt.contains("Return ONLY valid JSON"));
        assert!(prompt.contains("\"designs\""));
        assert!(!prompt.contains("ADDITIONAL INSTRUCTIONS"));
    }

    #[test]
    fn test_append_mode_keeps_default_content() {
        let prompt = build_design_prompt(
            &params(dims()),
            PromptMode::Append,
            "Always use dark backgrounds",
            None,
        );
        assert!(prompt.contains("social media card designer"));
        assert!(prompt.contains("ADDITIONAL INSTRUCTIONS:\nAlways use dark backgrounds"));
        assert!(prompt.contains("Return ONLY valid JSON"));
    }

    #[test]
    fn test_custom_mode_replaces_default_but_keeps_contract() {
        let prompt = build_design_prompt(
            &params(dims()),
            PromptMode::Custom,
            "Make a card for {{title}} at {{width}}x{{height}}, design {{designNumber}}/{{numberOfDesigns}}",
            None,
        );
        assert!(prompt.starts_with("Make a card for Rust Error Handling at 1200x630, design 2/5"));
        assert!(!prompt.contains("social media card designer"));
        assert!(prompt.contains("Return ONLY valid JSON"));
    }

    #[test]
    fn test_blank_custom_instructions_fall_back_to_default() {
        let prompt = build_design_prompt(&params(dims()), PromptMode::Custom, "   ", None);
        assert!(prompt.contains("social media card designer"));
    }

    #[test]
    fn test_chat_message_forces_append_mode() {
        let prompt = build_design_prompt(
            &params(dims()),
            PromptMode::Custom,
            "ignored configured text",
            Some("Use the brand color #ff6600"),
        );
        assert!(prompt.contains("social media card designer"));
        assert!(prompt.contains("ADDITIONAL INSTRUCTIONS:\nUse the brand color #ff6600"));
        assert!(!prompt.contains("ignored configured text"));
    }

    #[test]
    fn test_batch_mode_requests_exact_count() {
        let mut p = params(dims());
        p.batch_mode = true;
        let prompt = build_design_prompt(&p, PromptMode::Default, "", None);
        assert!(prompt.contains("Create EXACTLY 5 design variations"));
        assert!(prompt.contains("Do not create more or fewer"));
    }

    #[test]
    fn test_summarization_prompt_embeds_content() {
        let prompt = build_summarization_prompt("Hello world post");
        assert!(prompt.contains("Hello world post"));
        assert!(prompt.contains("\"summary\""));
    }

    #[test]
    fn test_modification_prompt_embeds_all_designs() {
        let designs = vec![
            CardDesign {
                title: "Bold Split".to_string(),
                html: "<div>one</div>".to_string(),
                generation_time_ms: 0,
            },
            CardDesign {
                title: "Minimal".to_string(),
                html: "<div>two</div>".to_string(),
                generation_time_ms: 0,
            },
        ];
        let prompt = build_modification_prompt(&designs, dims(), "make design 2 darker");
        assert!(prompt.contains("Design 1: Bold Split"));
        assert!(prompt.contains("Design 2: Minimal"));
        assert!(prompt.contains("make design 2 darker"));
        assert!(prompt.contains("COMPLETE set of designs"));
        assert!(prompt.contains("Return ONLY valid JSON"));
    }
}
