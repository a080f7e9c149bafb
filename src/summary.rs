use std::collections::BTreeMap;

use crate::structs::RentRow;

/// Sum of amounts per month label. Pure and order-insensitive; native f64
/// summation, so large sums carry the usual floating-point imprecision.
pub fn monthly_totals(records: &[RentRow]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for record in records {
        *totals.entry(record.month.clone()).or_insert(0.0) += record.amount;
    }
    totals
}

/// Sum of amounts per tenant name. Same contract as [`monthly_totals`].
pub fn tenant_totals(records: &[RentRow]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for record in records {
        *totals.entry(record.tenant_name.clone()).or_insert(0.0) += record.amount;
    }
    totals
}

/// Renders records as `Tenant,Month,Amount,Date,Notes` CSV. Every field is
/// wrapped in double quotes with no internal escaping, so names or notes
/// containing a double quote produce a malformed row. Matches the legacy
/// export byte for byte.
pub fn export_csv(records: &[RentRow]) -> String {
    let mut out = String::from("Tenant,Month,Amount,Date,Notes\n");
    for record in records {
        out.push_str(&format!(
            "\"{}\",\"{}\",\"{}\",\"{}\",\"{}\"\n",
            record.tenant_name,
            record.month,
            record.amount,
            record.date_collected,
            record.notes.as_deref().unwrap_or("")
        ));
    }
    out
}
