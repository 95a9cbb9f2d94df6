use crate::perception::types::Marker;

/// Builds the locate prompt sent alongside the (possibly annotated) screenshot.
pub fn build_locate_prompt(description: &str, markers: &[Marker]) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are locating a single UI element in a screenshot.\n");
    prompt.push_str(&format!("Element: {}\n\n", description.trim()));

    if !markers.is_empty() {
        prompt.push_str(
            "Yellow numbered dots mark places that were clicked before, labelled with their \
             normalized (x,y) coordinates. They are hints only and are not part of the interface. \
             Ignore the yellow markers when judging what the element looks like, and never return \
             a marker itself as the answer.\n",
        );
        let listed: Vec<String> = markers.iter().map(|m| format!("#{} at ({})", m.label, m.norm_label)).collect();
        prompt.push_str(&format!("Markers: {}\n\n", listed.join(", ")));
    }

    prompt.push_str(
        "Respond with JSON only, in exactly this format:\n\
         {\"box_2d\": [ymin, xmin, ymax, xmax], \"confidence\": 0-100}\n\
         All four box values are normalized to 0-1000 relative to the image (0,0 is the top-left corner). \
         confidence is how sure you are that the box contains the requested element. \
         If the element is not visible, return a box of your best guess with a low confidence.",
    );
    prompt
}
