use crate::server::response::ApiError;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_username(name: &str) -> Result<(), ApiError> {
    if name.len() < MIN_USERNAME_LEN || name.len() > MAX_USERNAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Username must be {MIN_USERNAME_LEN}-{MAX_USERNAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::bad_request(
            "Username can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// HH:MM in 24h notation.
fn parse_time(value: &str) -> Option<u32> {
    let (h, m) = value.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

pub fn validate_time(value: &str, field: &str) -> Result<u32, ApiError> {
    parse_time(value)
        .ok_or_else(|| ApiError::bad_request(format!("{field} must be HH:MM in 24h time")))
}

pub fn validate_date(value: &str) -> Result<(), ApiError> {
    let ok = value.len() == 10
        && value.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if ok {
        Ok(())
    } else {
        Err(ApiError::bad_request("workDate must be YYYY-MM-DD"))
    }
}

/// End must come after start on the same day.
pub fn validate_time_order(start: u32, end: u32) -> Result<(), ApiError> {
    if end > start {
        Ok(())
    } else {
        Err(ApiError::bad_request("endTime must be after startTime"))
    }
}

/// Shift length in hours, to two decimal places.
pub fn duration_hours(start: u32, end: u32) -> f64 {
    let minutes = end.saturating_sub(start);
    (f64::from(minutes) / 60.0 * 100.0).round() / 100.0
}

/// Ownership marker appended to the notes column. Legacy sheets have no
/// username column, so membership rides along in free text.
pub fn user_tag(username: &str) -> String {
    format!("[@user:{username}]")
}

/// Appends the owner tag to notes unless it is already present.
pub fn ensure_user_tag(notes: &str, username: &str) -> String {
    let tag = user_tag(username);
    if notes.contains(&tag) {
        return notes.to_string();
    }
    if notes.is_empty() {
        tag
    } else {
        format!("{notes} {tag}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_parse_and_reject_bad_input() {
        assert_eq!(validate_time("09:30", "startTime").unwrap(), 570);
        assert_eq!(validate_time("00:00", "startTime").unwrap(), 0);
        assert!(validate_time("9:30", "startTime").is_err());
        assert!(validate_time("24:00", "startTime").is_err());
        assert!(validate_time("09:60", "startTime").is_err());
        assert!(validate_time("morning", "startTime").is_err());
    }

    #[test]
    fn duration_is_derived_in_hours() {
        assert_eq!(duration_hours(9 * 60, 17 * 60 + 30), 8.5);
        assert_eq!(duration_hours(9 * 60, 9 * 60 + 20), 0.33);
    }

    #[test]
    fn end_must_follow_start() {
        assert!(validate_time_order(9 * 60, 17 * 60).is_ok());
        assert!(validate_time_order(17 * 60, 9 * 60).is_err());
        assert!(validate_time_order(9 * 60, 9 * 60).is_err());
    }

    #[test]
    fn dates_validate_shape_only() {
        assert!(validate_date("2025-03-01").is_ok());
        assert!(validate_date("2025-3-1").is_err());
        assert!(validate_date("03/01/2025").is_err());
    }

    #[test]
    fn user_tag_is_appended_once() {
        assert_eq!(ensure_user_tag("", "alice"), "[@user:alice]");
        assert_eq!(ensure_user_tag("late start", "alice"), "late start [@user:alice]");
        assert_eq!(
            ensure_user_tag("late start [@user:alice]", "alice"),
            "late start [@user:alice]"
        );
    }
}
