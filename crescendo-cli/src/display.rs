use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crescendo_db::models::{Draw, ParameterRecord};
use crescendo_engine::backtest::BacktestReport;
use crescendo_engine::expert::Analysis;
use crescendo_engine::history::{BackfillReport, HistoryEntry};
use crescendo_engine::ingest::RefreshReport;
use crescendo_engine::matrix::Matrices;
use crescendo_engine::optimizer::OptimizationResult;
use crescendo_engine::prediction::Prediction;
use crescendo_engine::stats::StatsReport;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn join_numbers(numbers: &[u8]) -> String {
    let mut sorted = numbers.to_vec();
    sorted.sort();
    sorted
        .iter()
        .map(|b| format!("{:2}", b))
        .collect::<Vec<_>>()
        .join(" - ")
}

pub fn display_draws(draws: &[Draw]) {
    if draws.is_empty() {
        println!("Aucun tirage à afficher.");
        return;
    }

    let mut table = new_table(vec!["Tirage", "Date", "Boules", "Lettre", "Gain"]);
    for draw in draws {
        let gain = match draw.gain {
            Some(g) if g > 0.0 => format!("{:.2} €", g),
            _ => "—".to_string(),
        };
        table.add_row(vec![
            draw.draw_id.to_string(),
            draw.drawn_at.format("%d/%m/%Y %Hh%M").to_string(),
            join_numbers(&draw.balls),
            draw.bonus.map_or("—".to_string(), |c| c.to_string()),
            gain,
        ]);
    }
    println!("{table}");
}

pub fn display_import_summary(report: &RefreshReport) {
    println!("Import terminé :");
    println!("  Total lignes lues : {}", report.total);
    println!("  Insérés           : {}", report.inserted);
    println!("  Doublons ignorés  : {}", report.skipped);
    if report.errors > 0 {
        println!("  Erreurs           : {}", report.errors);
    }
}

pub fn display_backfill(report: &BackfillReport) {
    println!(
        "Reconstitution : {} tirages parcourus, {} prédictions ajoutées",
        report.scanned, report.filled
    );
}

pub fn display_stats(report: &StatsReport) {
    println!(
        "\n📊 Statistiques sur les {} derniers tirages ({} au total)\n",
        report.window, report.total_draws
    );

    let mut table = new_table(vec!["Chauds", "Fréq.", "Froids", "Fréq.", "En retard", "Retard"]);
    for i in 0..report.hot_numbers.len() {
        table.add_row(vec![
            Cell::new(format!("{:2}", report.hot_numbers[i].number)).fg(Color::Green),
            Cell::new(report.hot_numbers[i].count.to_string()),
            Cell::new(format!("{:2}", report.cold_numbers[i].number)).fg(Color::Blue),
            Cell::new(report.cold_numbers[i].count.to_string()),
            Cell::new(format!("{:2}", report.overdue_numbers[i].number)).fg(Color::Red),
            Cell::new(report.overdue_numbers[i].gap.to_string()),
        ]);
    }
    println!("{table}");

    println!("\n── Fréquences (tout l'historique) ──");
    let mut table = new_table(vec!["Numéro", "Fréquence"]);
    let mut sorted = report.frequency_all.clone();
    sorted.sort_by(|a, b| b.count.cmp(&a.count).then(a.number.cmp(&b.number)));
    for entry in &sorted {
        table.add_row(vec![format!("{:2}", entry.number), entry.count.to_string()]);
    }
    println!("{table}");

    let parity = report
        .parity_stats
        .iter()
        .map(|p| format!("{} {}", p.name, p.value))
        .collect::<Vec<_>>()
        .join(" / ");
    let decades = report
        .decade_stats
        .iter()
        .map(|d| format!("{} : {}", d.name, d.value))
        .collect::<Vec<_>>()
        .join(", ");
    println!("\nParité : {}", parity);
    println!("Dizaines : {}", decades);

    let letters = report
        .bonus_stats
        .iter()
        .map(|b| format!("{} ×{} (retard {})", b.letter, b.count, b.gap))
        .collect::<Vec<_>>()
        .join(", ");
    println!("Lettres : {}", letters);
}

pub fn display_prediction(prediction: &Prediction) {
    println!("\n🎯 Prédiction pour le tirage de {}\n", prediction.next_draw_time);

    let mut table = new_table(vec!["Modèle", "Numéros", "Indice"]);
    table.add_row(vec![
        Cell::new("Statistique"),
        Cell::new(join_numbers(&prediction.statistical.numbers)).fg(Color::Green),
        Cell::new(format!("{:.1} %", prediction.statistical.confidence)),
    ]);
    table.add_row(vec![
        Cell::new("Algorithmique"),
        Cell::new(join_numbers(&prediction.algorithmic.numbers)).fg(Color::Cyan),
        Cell::new("—"),
    ]);
    println!("{table}");

    println!("\n── Détail statistique ──");
    let mut table = new_table(vec!["Numéro", "Score", "Fréq.", "Retard"]);
    for d in &prediction.statistical.details {
        table.add_row(vec![
            format!("{:2}", d.number),
            format!("{:.4}", d.score),
            d.freq.to_string(),
            d.gap.to_string(),
        ]);
    }
    println!("{table}");
}

pub fn display_matrix(matrices: &Matrices, number: u8) {
    let idx = (number - 1) as usize;
    println!(
        "\n🔗 Matrices sur {} tirages, ligne du {}\n",
        matrices.draw_count, number
    );
    let mut table = new_table(vec!["Numéro", "P(suivant)", "Co-occurrences"]);
    let row_a = matrices.temporal.row(idx);
    let row_b = matrices.spatial.row(idx);
    let mut order: Vec<usize> = (0..row_a.len()).collect();
    order.sort_by(|&a, &b| row_a[b].total_cmp(&row_a[a]).then(a.cmp(&b)));
    for j in order {
        table.add_row(vec![
            format!("{:2}", j + 1),
            format!("{:.4}", row_a[j]),
            row_b[j].to_string(),
        ]);
    }
    println!("{table}");
}

pub fn display_history(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("Aucun tirage à afficher.");
        return;
    }
    let mut table = new_table(vec!["Tirage", "Boules", "Prédiction", "Trouvés", "Gain"]);
    for e in entries {
        let predicted = e
            .prediction
            .as_ref()
            .map_or("—".to_string(), |p| join_numbers(&p.statistical));
        let found = Cell::new(e.matches_count.to_string());
        let found = if e.matches_count > 0 { found.fg(Color::Green) } else { found };
        table.add_row(vec![
            Cell::new(e.draw.draw_id.to_string()),
            Cell::new(join_numbers(&e.draw.balls)),
            Cell::new(predicted),
            found,
            Cell::new(format!("{:.2} €", e.gain)),
        ]);
    }
    println!("{table}");
}

pub fn display_analysis(analysis: &Analysis, report: &BacktestReport, history: &[ParameterRecord]) {
    println!("\n🧠 {}", analysis.message);
    println!("Paramètres actifs : {}", analysis.current_params);
    println!("Coups au but : {}/{}", report.hits, report.possible);

    if !history.is_empty() {
        println!("\n── Historique des paramètres ──");
        let mut table = new_table(vec!["Appliqué le", "Paramètres", "Actif", "Notes"]);
        for record in history {
            table.add_row(vec![
                record.applied_at.format("%d/%m/%Y %H:%M").to_string(),
                record.params.to_string(),
                if record.active { "oui" } else { "" }.to_string(),
                record.notes.clone(),
            ]);
        }
        println!("{table}");
    }
}

pub fn display_optimization(result: &OptimizationResult) {
    println!("\n🔬 {}", result.message);
    let mut table = new_table(vec!["", "Paramètres", "Précision"]);
    table.add_row(vec![
        Cell::new("Actuel"),
        Cell::new(result.current_params.to_string()),
        Cell::new(format!("{:.2} %", result.current_accuracy * 100.0)),
    ]);
    let proposed = Cell::new(result.proposed_params.to_string());
    table.add_row(vec![
        Cell::new("Proposé"),
        if result.found_better { proposed.fg(Color::Green) } else { proposed },
        Cell::new(format!("{:.2} %", result.best_accuracy * 100.0)),
    ]);
    println!("{table}");
    println!(
        "Stratégie {} : {} candidats évalués",
        result.strategy, result.candidates_evaluated
    );
    if result.found_better {
        let p = result.proposed_params;
        println!(
            "\nPour appliquer : crescendo apply --freq {} --gap {} --decay {}",
            p.freq_weight, p.gap_weight, p.decay_rate
        );
    }
}
