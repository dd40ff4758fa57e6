use chrono::NaiveDate;
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

/// Date ordering and stay length. `today` is `None` when past check-ins are allowed.
pub(crate) fn validate_stay(
    check_in: NaiveDate,
    check_out: NaiveDate,
    today: Option<NaiveDate>,
) -> Result<Span, EngineError> {
    let span = Span::try_new(check_in, check_out)
        .ok_or_else(|| EngineError::validation("check_out must be after check_in"))?;
    if span.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    if let Some(today) = today
        && check_in < today
    {
        return Err(EngineError::validation("check_in is in the past"));
    }
    Ok(span)
}

/// Date ordering for read-only availability queries.
pub(crate) fn validate_query(check_in: NaiveDate, check_out: NaiveDate) -> Result<Span, EngineError> {
    let span = Span::try_new(check_in, check_out)
        .ok_or_else(|| EngineError::validation("check_out must be after check_in"))?;
    if span.nights() > MAX_QUERY_NIGHTS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(span)
}

pub(crate) fn validate_guests(guests: u32) -> Result<(), EngineError> {
    if guests == 0 {
        return Err(EngineError::validation("num_guests must be at least 1"));
    }
    Ok(())
}

pub(crate) fn validate_amount(amount: Decimal) -> Result<(), EngineError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(EngineError::validation("total_amount must not be negative"));
    }
    Ok(())
}

/// Upper-cased currency code of 3..=8 ASCII letters.
pub(crate) fn normalize_currency(raw: &str) -> Result<String, EngineError> {
    let code = raw.trim();
    if code.len() < MIN_CURRENCY_LEN
        || code.len() > MAX_CURRENCY_LEN
        || !code.bytes().all(|b| b.is_ascii_alphabetic())
    {
        return Err(EngineError::validation("currency must be 3 to 8 ASCII letters"));
    }
    Ok(code.to_ascii_uppercase())
}

pub(crate) fn validate_name(field: &'static str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{field} must not be empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

pub(crate) fn validate_text(value: Option<&str>) -> Result<(), EngineError> {
    if value.is_some_and(|v| v.len() > MAX_TEXT_LEN) {
        return Err(EngineError::LimitExceeded("text too long"));
    }
    Ok(())
}

pub(crate) fn validate_hotel_info(info: &HotelInfo) -> Result<(), EngineError> {
    validate_name("name", &info.name)?;
    validate_name("city", &info.city)?;
    validate_name("country", &info.country)?;
    validate_text(info.address.as_deref())?;
    validate_text(info.description.as_deref())?;
    if let Some(stars) = info.star_rating
        && !(1..=5).contains(&stars)
    {
        return Err(EngineError::validation("star_rating must be between 1 and 5"));
    }
    Ok(())
}

pub(crate) fn validate_room_type_info(info: &RoomTypeInfo) -> Result<(), EngineError> {
    validate_name("name", &info.name)?;
    validate_text(info.description.as_deref())?;
    if info.capacity == 0 {
        return Err(EngineError::validation("capacity must be at least 1"));
    }
    if info.capacity > MAX_ROOM_CAPACITY {
        return Err(EngineError::LimitExceeded("capacity too large"));
    }
    if info.base_price.is_sign_negative() && !info.base_price.is_zero() {
        return Err(EngineError::validation("base_price must not be negative"));
    }
    Ok(())
}

pub(crate) fn validate_room_number(number: &str) -> Result<(), EngineError> {
    if number.trim().is_empty() {
        return Err(EngineError::validation("room number must not be empty"));
    }
    if number.len() > MAX_ROOM_NUMBER_LEN {
        return Err(EngineError::LimitExceeded("room number too long"));
    }
    Ok(())
}

/// First stay on the room, other than `ignore`'s, that shares a night with `span`.
pub(crate) fn first_conflict(room: &RoomState, span: &Span, ignore: Option<Ulid>) -> Option<Ulid> {
    room.overlapping(span)
        .map(|s| s.booking_id)
        .find(|id| Some(*id) != ignore)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn stay_must_be_ordered() {
        assert!(validate_stay(d(2024, 6, 5), d(2024, 6, 1), None).is_err());
        assert!(validate_stay(d(2024, 6, 5), d(2024, 6, 5), None).is_err());
        let span = validate_stay(d(2024, 6, 1), d(2024, 6, 5), None).unwrap();
        assert_eq!(span.nights(), 4);
    }

    #[test]
    fn stay_rejects_past_check_in() {
        let today = d(2024, 6, 10);
        assert!(matches!(
            validate_stay(d(2024, 6, 9), d(2024, 6, 12), Some(today)),
            Err(EngineError::Validation(_))
        ));
        assert!(validate_stay(d(2024, 6, 10), d(2024, 6, 12), Some(today)).is_ok());
    }

    #[test]
    fn stay_length_capped() {
        let err = validate_stay(d(2024, 1, 1), d(2025, 6, 1), None).unwrap_err();
        assert!(matches!(err, EngineError::LimitExceeded(_)));
    }

    #[test]
    fn currency_normalized() {
        assert_eq!(normalize_currency("usd").unwrap(), "USD");
        assert_eq!(normalize_currency(" npr ").unwrap(), "NPR");
        assert!(normalize_currency("US").is_err());
        assert!(normalize_currency("TOOLONGXX").is_err());
        assert!(normalize_currency("U5D").is_err());
    }

    #[test]
    fn amount_and_guests() {
        assert!(validate_amount(Decimal::ZERO).is_ok());
        assert!(validate_amount(Decimal::new(-1, 2)).is_err());
        assert!(validate_guests(0).is_err());
        assert!(validate_guests(1).is_ok());
    }

    #[test]
    fn conflict_finds_overlap_only() {
        let mut room = RoomState::new(Ulid::new(), "101".into(), RoomStatus::Available);
        let bid = Ulid::new();
        room.insert_stay(Stay {
            booking_id: bid,
            span: Span::new(d(2024, 6, 1), d(2024, 6, 5)),
        });
        let later = Span::new(d(2024, 6, 3), d(2024, 6, 7));
        assert_eq!(first_conflict(&room, &later, None), Some(bid));
        assert_eq!(first_conflict(&room, &later, Some(bid)), None);
        assert_eq!(first_conflict(&room, &Span::new(d(2024, 6, 5), d(2024, 6, 8)), None), None);
    }
}
