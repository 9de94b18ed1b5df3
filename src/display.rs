use crate::counter::config::Digit;
use crate::counter::delta::TimeDelta;

pub fn sign(countdown: bool) -> &'static str {
    if countdown { "-" } else { "+" }
}

/// Tooltip text for one unit, e.g. `Remaining hours`.
pub fn unit_label(digit: Digit, countdown: bool) -> String {
    let direction = if countdown { "Remaining" } else { "Elapsed" };
    format!("{direction} {}", digit.unit_name())
}

/// `T-DD:HH:MM:SS` restricted to the selected units. Units always appear in
/// d/h/m/s order; days grow past two digits when needed.
pub fn format_counter(delta: &TimeDelta, digits: &[Digit], countdown: bool) -> String {
    let segments = Digit::ALL
        .into_iter()
        .filter(|digit| digits.contains(digit))
        .map(|digit| format!("{:02}", delta.get(digit)))
        .collect::<Vec<_>>();
    format!("T{}{}", sign(countdown), segments.join(":"))
}
